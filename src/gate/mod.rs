pub mod prompt;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::browser::Browser;

/// Where an indicator is looked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Url,
    Text,
    #[default]
    Any,
}

/// A substring that means a human has to step in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub pattern: String,
    #[serde(default)]
    pub scope: Scope,
    pub description: String,
}

impl Indicator {
    pub fn new(pattern: &str, scope: Scope, description: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            scope,
            description: description.to_string(),
        }
    }

    fn matches(&self, url: &str, text: &str) -> bool {
        let pattern = self.pattern.to_lowercase();
        match self.scope {
            Scope::Url => url.contains(&pattern),
            Scope::Text => text.contains(&pattern),
            Scope::Any => url.contains(&pattern) || text.contains(&pattern),
        }
    }
}

pub fn default_indicators() -> Vec<Indicator> {
    vec![
        Indicator::new("captcha", Scope::Any, "CAPTCHA"),
        Indicator::new("verify you are human", Scope::Text, "human verification"),
        Indicator::new("i'm not a robot", Scope::Text, "human verification"),
        Indicator::new("security check", Scope::Any, "security check"),
        Indicator::new("suspicious activity", Scope::Text, "security check"),
        Indicator::new("unusual activity", Scope::Text, "security check"),
        Indicator::new("challenge", Scope::Url, "security challenge"),
        Indicator::new("checkpoint", Scope::Url, "security challenge"),
        Indicator::new("two-factor", Scope::Any, "two-factor authentication"),
        Indicator::new("two-step verification", Scope::Text, "two-factor authentication"),
        Indicator::new("verification code", Scope::Any, "verification code"),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Dialog when a display is available, terminal when stdin is a TTY,
    /// deny otherwise.
    #[default]
    Auto,
    Dialog,
    Terminal,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
}

impl Prompt {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Whoever can act in the browser on the automation's behalf.
#[async_trait]
pub trait HumanGate: Send + Sync {
    /// Blocks until the operator continues (`true`) or gives up (`false`).
    async fn await_acknowledgement(&self, prompt: &Prompt) -> bool;
}

/// A tripped indicator on a concrete page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervention {
    pub indicator: Indicator,
    pub url: String,
}

impl fmt::Display for Intervention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.indicator.description, self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Running,
    Paused(Intervention),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// The operator gave up (or the wait timed out) while the page was
    /// blocked.
    Declined(Intervention),
}

/// Stops the automation whenever a page asks for a human.
pub struct InterventionGate {
    indicators: Vec<Indicator>,
    human: Box<dyn HumanGate>,
    timeout: Option<Duration>,
    state: GateState,
}

impl InterventionGate {
    pub fn new(
        indicators: Vec<Indicator>,
        human: Box<dyn HumanGate>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            indicators,
            human,
            timeout,
            state: GateState::Running,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// First indicator present in the URL or text, case-insensitive.
    pub fn detect(&self, url: &str, text: &str) -> Option<Intervention> {
        let (lower_url, lower_text) = (url.to_lowercase(), text.to_lowercase());
        self.indicators
            .iter()
            .find(|i| i.matches(&lower_url, &lower_text))
            .map(|indicator| Intervention {
                indicator: indicator.clone(),
                url: url.to_string(),
            })
    }

    /// Checks the current page and, while it is blocked, waits for the
    /// operator. Every acknowledgement is followed by a fresh check, so a
    /// second challenge pauses again. A clean page returns immediately.
    pub async fn checkpoint<B: Browser>(&mut self, browser: &B) -> Result<Verdict> {
        loop {
            let url = browser.current_url().await?;
            let text = browser.page_text().await?;

            let Some(intervention) = self.detect(&url, &text) else {
                if self.state != GateState::Running {
                    info!("page clear, resuming");
                }
                self.state = GateState::Running;
                return Ok(Verdict::Proceed);
            };

            warn!("automation paused: {}", intervention);
            self.state = GateState::Paused(intervention.clone());

            let prompt = Prompt::new(
                format!("{} detected", intervention.indicator.description),
                format!(
                    "The page at {} needs a human ({}).\nResolve it in the browser window, then continue.",
                    intervention.url, intervention.indicator.description
                ),
            );
            if !self.acknowledge(&prompt).await {
                warn!("intervention declined: {}", intervention);
                return Ok(Verdict::Declined(intervention));
            }
            debug!("acknowledged, re-checking page");
        }
    }

    /// Asks the operator directly, honouring the configured timeout. A
    /// timeout counts as a decline.
    pub async fn acknowledge(&self, prompt: &Prompt) -> bool {
        let wait = self.human.await_acknowledgement(prompt);
        match self.timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(answer) => answer,
                Err(_) => {
                    warn!("no answer within {}s, treating as declined", limit.as_secs());
                    false
                }
            },
        }
    }
}
