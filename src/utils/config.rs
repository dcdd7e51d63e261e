use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use easy_config_store::ConfigStore;
use eyre::{Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::browser::Strategy;
use crate::chat::backend::BackendKind;
use crate::gate::{GateMode, Indicator};
use crate::sites::{SiteDefinition, SiteKind};

pub type Config = Arc<ConfigInner>;

pub fn config(path: PathBuf) -> Result<Config> {
    // ConfigStore would happily write a default file here, which would then
    // drive a run with a placeholder profile.
    if !path.exists() {
        bail!(
            "config missing: {} does not exist (see config.default.toml)",
            path.display()
        );
    }

    let config_store = ConfigStore::<ConfigInner>::read(path, "config".to_string())?;
    let inner = (*config_store).clone();
    inner.validate()?;

    info!("config parsing successful");
    debug!("loaded configuration:\n{}", toml::to_string_pretty(&inner)?);

    Ok(Arc::new(inner))
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigInner {
    pub profile: Profile,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub intervention: InterventionConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default = "default_sites")]
    pub sites: Vec<SiteConfig>,
}

impl ConfigInner {
    fn validate(&self) -> Result<()> {
        if self.profile.first_name.trim().is_empty() || self.profile.email.trim().is_empty() {
            bail!("profile.first_name and profile.email are required");
        }
        if self.search.keywords.is_empty() {
            bail!("search.keywords must contain at least one entry");
        }
        let [min, max] = self.flow.between_jobs_secs;
        if min > max {
            bail!("flow.between_jobs_secs must be [min, max], got [{}, {}]", min, max);
        }
        if !(0.0..=1.0).contains(&self.analyzer.threshold) {
            bail!("analyzer.threshold must be within 0..1");
        }
        for site in &self.sites {
            SiteDefinition::with_overrides(site.name, &site.selectors)?;
        }
        Ok(())
    }
}

/// Personal and contact details typed into application forms. Read-only for
/// the whole run.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub website: Option<String>,
    pub current_title: Option<String>,
    #[serde(default)]
    pub experience_years: u32,
    pub desired_salary: Option<String>,
    pub availability: Option<String>,
    #[serde(default = "default_true")]
    pub work_authorized: bool,
    #[serde(default)]
    pub requires_sponsorship: bool,
    pub education: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub cover_letter: Option<String>,
    pub resume_path: Option<PathBuf>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    #[serde(default = "default_locations")]
    pub locations: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub experience_level: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["Software Engineer".to_string()],
            locations: default_locations(),
            exclude: Vec::new(),
            experience_level: None,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_per_site")]
    pub max_applications_per_site: usize,
    #[serde(default = "default_max_per_day")]
    pub max_applications_per_day: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_applications_per_site: default_max_per_site(),
            max_applications_per_day: default_max_per_day(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chrome,
    Firefox,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub engine: BrowserEngine,
    #[serde(default)]
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    #[serde(default = "default_window")]
    pub window: [u32; 2],
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            engine: BrowserEngine::default(),
            headless: false,
            user_data_dir: None,
            user_agent: None,
            window: default_window(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct InterventionConfig {
    #[serde(default)]
    pub mode: GateMode,
    /// Unset means wait for the operator indefinitely.
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub optimistic_manual_success: bool,
    #[serde(default)]
    pub extra_indicators: Vec<Indicator>,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::default(),
            timeout_secs: None,
            optimistic_manual_success: true,
            extra_indicators: Vec::new(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct FlowConfig {
    #[serde(default = "default_max_form_steps")]
    pub max_form_steps: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_listings")]
    pub max_listings_per_page: usize,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_between_jobs")]
    pub between_jobs_secs: [u64; 2],
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_form_steps: default_max_form_steps(),
            max_pages: default_max_pages(),
            max_listings_per_page: default_max_listings(),
            settle_ms: default_settle_ms(),
            between_jobs_secs: default_between_jobs(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: BackendKind,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub skip_unsuitable: bool,
    #[serde(default)]
    pub answer_fields: bool,
    #[serde(default = "default_min_decision_confidence")]
    pub min_decision_confidence: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: BackendKind::default(),
            endpoint: None,
            model: None,
            api_key_env: None,
            threshold: default_threshold(),
            skip_unsuitable: true,
            answer_fields: false,
            min_decision_confidence: default_min_decision_confidence(),
            max_retries: default_max_retries(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: SiteKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: u32,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
    /// Replaces the built-in strategies of the named element, e.g.
    /// `selectors.apply = [{ kind = "css", value = ".jobs-apply-button" }]`.
    #[serde(default)]
    pub selectors: BTreeMap<String, Vec<Strategy>>,
}

impl SiteConfig {
    pub fn credentials(&self) -> Option<(String, String)> {
        let user = std::env::var(self.username_env.as_deref()?).ok()?;
        let pass = std::env::var(self.password_env.as_deref()?).ok()?;
        Some((user, pass))
    }
}

fn default_true() -> bool {
    true
}

fn default_locations() -> Vec<String> {
    vec!["Remote".to_string()]
}

fn default_max_per_site() -> usize {
    10
}

fn default_max_per_day() -> usize {
    25
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_window() -> [u32; 2] {
    [1366, 900]
}

fn default_max_form_steps() -> usize {
    5
}

fn default_max_pages() -> usize {
    5
}

fn default_max_listings() -> usize {
    25
}

fn default_settle_ms() -> u64 {
    1500
}

fn default_between_jobs() -> [u64; 2] {
    [20, 45]
}

fn default_threshold() -> f32 {
    0.3
}

fn default_min_decision_confidence() -> f32 {
    0.6
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_sites() -> Vec<SiteConfig> {
    vec![SiteConfig {
        name: SiteKind::LinkedIn,
        enabled: true,
        priority: 1,
        username_env: Some("AUTO_APPLY_LINKEDIN_EMAIL".to_string()),
        password_env: Some("AUTO_APPLY_LINKEDIN_PASSWORD".to_string()),
        selectors: BTreeMap::new(),
    }]
}

impl Default for ConfigInner {
    fn default() -> Self {
        let cfg = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.default.toml",));

        toml::from_str(cfg).unwrap() // should be okay
    }
}
