use eyre::{Result, eyre};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::chat::backend::{self, LlmBackend};
use crate::chat::heuristic;
use crate::models::job::{AutomationDecision, JobListing};
use crate::utils::config::{AnalyzerConfig, Profile};

const SCORE_PROMPT: &str = include_str!("score_prompt.txt");
const DRAFT_PROMPT: &str = include_str!("draft_prompt.txt");
const FIELD_PROMPT: &str = include_str!("field_prompt.txt");

/// Shortest model output accepted as a cover letter.
const MIN_LETTER_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub compatibility_score: f32,
    pub should_apply: bool,
    pub reasoning: String,
    pub source: ScoreSource,
}

/// Advisory job scoring and text generation. Every method answers even when
/// the model is gone; only the quality of the answer changes.
pub struct JobAnalyzer {
    backend: Option<Box<dyn LlmBackend>>,
    threshold: f32,
}

impl JobAnalyzer {
    /// Keyword heuristic only.
    pub fn offline(threshold: f32) -> Self {
        Self {
            backend: None,
            threshold,
        }
    }

    /// Keeps `backend` only if it answers a probe.
    pub async fn new(backend: Option<Box<dyn LlmBackend>>, threshold: f32) -> Self {
        let backend = match backend {
            Some(b) if b.probe().await => {
                info!("analyzer using {}", b.name());
                Some(b)
            }
            Some(b) => {
                warn!("{} is unreachable, falling back to keyword analysis", b.name());
                None
            }
            None => None,
        };
        Self { backend, threshold }
    }

    pub async fn connect(config: &AnalyzerConfig) -> Self {
        if !config.enabled {
            return Self::offline(config.threshold);
        }
        match backend::build(config) {
            Ok(b) => Self::new(Some(b), config.threshold).await,
            Err(e) => {
                warn!("analyzer backend unavailable ({}), using keyword analysis", e);
                Self::offline(config.threshold)
            }
        }
    }

    pub fn is_online(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn score(&self, job: &JobListing, profile: &Profile) -> MatchScore {
        let Some(backend) = &self.backend else {
            return heuristic::score(job, profile, self.threshold);
        };

        let prompt = fill(SCORE_PROMPT, job, profile);
        match backend.complete(&prompt, 300).await.and_then(|r| parse_score(&r)) {
            Ok(score) => {
                debug!("{}: {:.2} ({})", job, score.compatibility_score, score.reasoning);
                score
            }
            Err(e) => {
                debug!("model score unusable ({}), using keyword analysis", e);
                heuristic::score(job, profile, self.threshold)
            }
        }
    }

    pub async fn draft(&self, job: &JobListing, profile: &Profile) -> String {
        if let Some(backend) = &self.backend {
            let prompt = fill(DRAFT_PROMPT, job, profile);
            match backend.complete(&prompt, 600).await {
                Ok(letter) if letter.trim().len() >= MIN_LETTER_CHARS => {
                    return letter.trim().to_string();
                }
                Ok(_) => debug!("model cover letter too short, using template"),
                Err(e) => debug!("cover letter generation failed ({}), using template", e),
            }
        }
        heuristic::cover_letter(job, profile)
    }

    /// What to type into a field the static map does not know. `None` when
    /// offline or when the answer is unusable.
    pub async fn decide_field(
        &self,
        caption: &str,
        job: &JobListing,
        profile: &Profile,
    ) -> Option<AutomationDecision> {
        let backend = self.backend.as_ref()?;
        let prompt = fill(FIELD_PROMPT, job, profile).replace("{caption}", caption);

        match backend.complete(&prompt, 200).await.and_then(|r| parse_decision(&r)) {
            Ok(decision) => Some(decision),
            Err(e) => {
                debug!("no usable answer for {:?}: {}", caption, e);
                None
            }
        }
    }
}

fn fill(template: &str, job: &JobListing, profile: &Profile) -> String {
    let description: String = job.description.chars().take(1000).collect();
    template
        .replace("{title}", &job.title)
        .replace("{company}", &job.company)
        .replace("{location}", job.location.as_deref().unwrap_or("unspecified"))
        .replace("{description}", &description)
        .replace("{name}", &profile.full_name())
        .replace(
            "{current_title}",
            profile.current_title.as_deref().unwrap_or("unspecified"),
        )
        .replace("{experience_years}", &profile.experience_years.to_string())
        .replace("{skills}", &profile.skills.join(", "))
        .replace("{education}", profile.education.as_deref().unwrap_or("unspecified"))
}

/// The outermost `{...}` of a reply; models like to wrap JSON in prose or
/// code fences.
fn extract_json(response: &str) -> Result<serde_json::Value> {
    let trimmed = response.trim();
    let json_start = trimmed
        .find('{')
        .ok_or_else(|| eyre!("no JSON object found in response"))?;
    let json_end = trimmed
        .rfind('}')
        .ok_or_else(|| eyre!("malformed JSON in response"))?;
    if json_end < json_start {
        return Err(eyre!("malformed JSON in response"));
    }
    Ok(serde_json::from_str(&trimmed[json_start..=json_end])?)
}

fn parse_score(response: &str) -> Result<MatchScore> {
    let parsed = extract_json(response)?;

    let compatibility_score = parsed["compatibility_score"]
        .as_f64()
        .ok_or_else(|| eyre!("missing compatibility_score"))?;
    let should_apply = parsed["should_apply"]
        .as_bool()
        .ok_or_else(|| eyre!("missing should_apply"))?;

    Ok(MatchScore {
        compatibility_score: (compatibility_score as f32).clamp(0.0, 1.0),
        should_apply,
        reasoning: parsed["reasoning"].as_str().unwrap_or_default().to_string(),
        source: ScoreSource::Model,
    })
}

fn parse_decision(response: &str) -> Result<AutomationDecision> {
    let mut decision: AutomationDecision = serde_json::from_value(extract_json(response)?)?;
    decision.confidence = decision.confidence.clamp(0.0, 1.0);
    Ok(decision)
}
