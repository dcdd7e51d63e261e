use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sites::SiteKind;

pub const UNKNOWN_POSITION: &str = "Unknown Position";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// A posting scraped from a results page. Lives only for one application
/// attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub site: SiteKind,
}

impl JobListing {
    pub fn new(site: SiteKind, url: impl Into<String>) -> Self {
        Self {
            title: UNKNOWN_POSITION.to_string(),
            company: UNKNOWN_COMPANY.to_string(),
            location: None,
            description: String::new(),
            url: url.into(),
            site,
        }
    }

    /// Title, company and whatever description is known, the text the
    /// exclusion filter looks at.
    pub fn searchable_text(&self) -> String {
        format!("{} {} {}", self.title, self.company, self.description)
    }
}

impl fmt::Display for JobListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.title, self.company)
    }
}

/// Terminal state of one application attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Submitted by the automation.
    Applied,
    /// A complex form the operator says they finished by hand, recorded this
    /// way only when `intervention.optimistic_manual_success` is off. Not
    /// counted against the limits.
    CompletedByHuman,
    /// No apply control, excluded, a duplicate, or judged unsuitable.
    Skipped,
    /// The operator declined to finish a complex form.
    Declined,
    /// An intervention was declined or timed out; the site run stops.
    Blocked,
    /// Something went wrong inside the flow.
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::CompletedByHuman)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Applied => "applied",
            Outcome::CompletedByHuman => "completed by human",
            Outcome::Skipped => "skipped",
            Outcome::Declined => "declined",
            Outcome::Blocked => "blocked",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub job: JobListing,
    pub outcome: Outcome,
    /// Whether the attempt counts against the application limits.
    pub counted: bool,
    pub reason: String,
    pub actions: Vec<String>,
    pub elapsed_secs: f64,
    pub ai_confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fill,
    Select,
    Click,
    Skip,
}

impl ActionKind {
    /// Action log line, e.g. "click submit button".
    pub fn describe(&self, target: &str) -> String {
        format!("{} {}", self, target)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Fill => "fill",
            ActionKind::Select => "select",
            ActionKind::Click => "click",
            ActionKind::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// One model-suggested step at a decision point. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDecision {
    pub action: ActionKind,
    pub target: String,
    pub input_value: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl AutomationDecision {
    /// The suggested value, then its alternatives. Blanks are dropped.
    pub fn answers(&self) -> Vec<String> {
        self.input_value
            .iter()
            .chain(&self.fallbacks)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_defaults_to_placeholders() {
        let job = JobListing::new(SiteKind::LinkedIn, "https://example.com/jobs/1");
        assert_eq!(job.title, UNKNOWN_POSITION);
        assert_eq!(job.company, UNKNOWN_COMPANY);
        assert_eq!(job.to_string(), "Unknown Position at Unknown Company");
    }

    #[test]
    fn only_applied_outcomes_are_successes() {
        assert!(Outcome::Applied.is_success());
        assert!(Outcome::CompletedByHuman.is_success());
        for o in [
            Outcome::Skipped,
            Outcome::Declined,
            Outcome::Blocked,
            Outcome::Failed,
        ] {
            assert!(!o.is_success(), "{o}");
        }
    }

    #[test]
    fn decision_parses_without_fallbacks() {
        let d: AutomationDecision = serde_json::from_str(
            r#"{"action":"fill","target":"Years of Rust","input_value":"4","confidence":0.8}"#,
        )
        .unwrap();
        assert_eq!(d.action, ActionKind::Fill);
        assert!(d.fallbacks.is_empty());
    }

    #[test]
    fn answers_put_the_suggestion_before_its_alternatives() {
        let d: AutomationDecision = serde_json::from_str(
            r#"{"action":"fill","target":"Colour","input_value":" ","confidence":0.9,"fallbacks":["Teal","","Blue "]}"#,
        )
        .unwrap();
        assert_eq!(d.answers(), vec!["Teal".to_string(), "Blue".to_string()]);
    }
}
