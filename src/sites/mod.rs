pub mod glassdoor;
pub mod indeed;
pub mod linkedin;

use std::collections::BTreeMap;
use std::fmt;

use eyre::{Result, bail};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::browser::{ElementSpec, Strategy};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    #[value(name = "linkedin")]
    LinkedIn,
    Indeed,
    Glassdoor,
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SiteKind::LinkedIn => "linkedin",
            SiteKind::Indeed => "indeed",
            SiteKind::Glassdoor => "glassdoor",
        };
        f.write_str(s)
    }
}

/// Names accepted under `[[sites]] selectors.<name>`.
pub const ELEMENT_NAMES: &[&str] = &[
    "email",
    "password",
    "login_continue",
    "login_button",
    "job_cards",
    "card_title",
    "card_company",
    "card_location",
    "card_link",
    "detail_title",
    "detail_company",
    "detail_description",
    "apply",
    "submit",
    "next",
    "dismiss",
    "next_page",
    "form_fields",
];

/// Sign-in form of a site. Some sites ask for the email first and only show
/// the password after `continue_button`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginPage {
    pub url: String,
    pub email: ElementSpec,
    pub password: ElementSpec,
    pub continue_button: ElementSpec,
    pub submit: ElementSpec,
}

/// Every selector the automation uses on one job board, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDefinition {
    pub kind: SiteKind,
    pub login: Option<LoginPage>,

    pub job_cards: ElementSpec,
    pub card_title: ElementSpec,
    pub card_company: ElementSpec,
    pub card_location: ElementSpec,
    pub card_link: ElementSpec,

    pub detail_title: ElementSpec,
    pub detail_company: ElementSpec,
    pub detail_description: ElementSpec,

    pub apply: ElementSpec,
    pub submit: ElementSpec,
    pub next: ElementSpec,
    pub dismiss: ElementSpec,
    pub next_page: ElementSpec,
    pub form_fields: ElementSpec,
}

impl SiteDefinition {
    pub fn builtin(kind: SiteKind) -> Self {
        match kind {
            SiteKind::LinkedIn => linkedin::definition(),
            SiteKind::Indeed => indeed::definition(),
            SiteKind::Glassdoor => glassdoor::definition(),
        }
    }

    /// Built-in tables with the configured replacements applied.
    pub fn with_overrides(
        kind: SiteKind,
        overrides: &BTreeMap<String, Vec<Strategy>>,
    ) -> Result<Self> {
        let mut site = Self::builtin(kind);
        for (name, strategies) in overrides {
            match site.element_mut(name) {
                Some(spec) => spec.strategies = strategies.clone(),
                None => bail!(
                    "unknown selector override `{}` for {} (known: {})",
                    name,
                    kind,
                    ELEMENT_NAMES.join(", ")
                ),
            }
        }
        Ok(site)
    }

    fn element_mut(&mut self, name: &str) -> Option<&mut ElementSpec> {
        let login = self.login.as_mut();
        Some(match name {
            "email" => &mut login?.email,
            "password" => &mut login?.password,
            "login_continue" => &mut login?.continue_button,
            "login_button" => &mut login?.submit,
            "job_cards" => &mut self.job_cards,
            "card_title" => &mut self.card_title,
            "card_company" => &mut self.card_company,
            "card_location" => &mut self.card_location,
            "card_link" => &mut self.card_link,
            "detail_title" => &mut self.detail_title,
            "detail_company" => &mut self.detail_company,
            "detail_description" => &mut self.detail_description,
            "apply" => &mut self.apply,
            "submit" => &mut self.submit,
            "next" => &mut self.next,
            "dismiss" => &mut self.dismiss,
            "next_page" => &mut self.next_page,
            "form_fields" => &mut self.form_fields,
            _ => return None,
        })
    }

    pub fn search_url(
        &self,
        keyword: &str,
        location: &str,
        experience_level: Option<&str>,
    ) -> Result<String> {
        let url = match self.kind {
            SiteKind::LinkedIn => linkedin::search_url(keyword, location, experience_level)?,
            SiteKind::Indeed => indeed::search_url(keyword, location)?,
            SiteKind::Glassdoor => glassdoor::search_url(keyword, location)?,
        };
        Ok(url.to_string())
    }
}

pub(crate) fn css(list: &[&str]) -> Vec<Strategy> {
    list.iter().map(|s| Strategy::css(s)).collect()
}

pub(crate) fn spec(description: &str, strategies: Vec<Strategy>) -> ElementSpec {
    ElementSpec::new(description, strategies)
}

pub(crate) fn url_with(base: &str, params: &[(&str, &str)]) -> Result<Url> {
    let params = params.iter().filter(|(_, v)| !v.trim().is_empty());
    Ok(Url::parse_with_params(base, params)?)
}
