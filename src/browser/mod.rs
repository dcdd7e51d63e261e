pub mod locator;
pub mod session;
pub mod template;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};

/// One way of finding an element. Site tables are ordered lists of these,
/// most specific first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Strategy {
    Css(String),
    XPath(String),
    /// Reference PNG matched against a fresh screenshot.
    Template(PathBuf),
}

impl Strategy {
    pub fn css(s: &str) -> Self {
        Strategy::Css(s.to_string())
    }

    pub fn xpath(s: &str) -> Self {
        Strategy::XPath(s.to_string())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Css(s) => write!(f, "css `{}`", s),
            Strategy::XPath(s) => write!(f, "xpath `{}`", s),
            Strategy::Template(p) => write!(f, "template `{}`", p.display()),
        }
    }
}

/// A DOM query the browser can run directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    Css(&'a str),
    XPath(&'a str),
}

/// Semantic element ("Easy Apply button") plus the strategies that may find
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub description: String,
    pub strategies: Vec<Strategy>,
    /// Case-insensitive text the element's text or aria-label must contain.
    pub must_contain: Option<String>,
}

impl ElementSpec {
    pub fn new(description: &str, strategies: Vec<Strategy>) -> Self {
        Self {
            description: description.to_string(),
            strategies,
            must_contain: None,
        }
    }

    pub fn containing(mut self, text: &str) -> Self {
        self.must_contain = Some(text.to_lowercase());
        self
    }
}

/// Everything the form filler reads off an input before deciding what to
/// type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDescriptor {
    pub tag: String,
    pub input_type: String,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub aria_label: String,
    pub label: String,
    pub value: String,
}

impl FieldDescriptor {
    /// Name, id, placeholder, aria-label and label text, lowercased.
    pub fn haystack(&self) -> String {
        [
            &self.name,
            &self.id,
            &self.placeholder,
            &self.aria_label,
            &self.label,
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Best human-readable caption.
    pub fn caption(&self) -> &str {
        [&self.label, &self.aria_label, &self.placeholder, &self.name, &self.id]
            .into_iter()
            .find(|s| !s.trim().is_empty())
            .map(|s| s.trim())
            .unwrap_or("")
    }

    pub fn is_select(&self) -> bool {
        self.tag.eq_ignore_ascii_case("select")
    }

    pub fn is_file(&self) -> bool {
        self.input_type.eq_ignore_ascii_case("file")
    }

    /// Text-like inputs the filler is allowed to type into.
    pub fn is_typeable(&self) -> bool {
        if self.tag.eq_ignore_ascii_case("textarea") {
            return true;
        }
        self.tag.eq_ignore_ascii_case("input")
            && matches!(
                self.input_type.to_lowercase().as_str(),
                "" | "text" | "email" | "tel" | "number" | "url"
            )
    }
}

/// The browser capabilities the automation needs. `SessionDriver` is the
/// WebDriver implementation; tests use a scripted one.
#[async_trait]
pub trait Browser: Send + Sync {
    type Element: Clone + fmt::Debug + Send + Sync;

    async fn navigate(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    /// Visible text of the whole page.
    async fn page_text(&self) -> Result<String>;
    /// PNG bytes of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn find_all(&self, selector: Selector<'_>) -> Result<Vec<Self::Element>>;
    async fn find_within(
        &self,
        parent: &Self::Element,
        selector: Selector<'_>,
    ) -> Result<Vec<Self::Element>>;

    /// Displayed and enabled.
    async fn is_interactable(&self, element: &Self::Element) -> Result<bool>;
    async fn text(&self, element: &Self::Element) -> Result<String>;
    async fn attr(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;
    /// Absolute link target of an anchor (or of the first anchor inside).
    async fn link(&self, element: &Self::Element) -> Result<Option<String>>;
    async fn describe_field(&self, element: &Self::Element) -> Result<FieldDescriptor>;

    async fn click(&self, element: &Self::Element) -> Result<()>;
    /// Clicks whatever sits at the given screenshot pixel.
    async fn click_at(&self, x: u32, y: u32) -> Result<()>;
    async fn fill(&self, element: &Self::Element, value: &str) -> Result<()>;
    /// Picks the first option whose text contains any of `wanted`
    /// (case-insensitive). Returns the chosen option text.
    async fn select_option(
        &self,
        element: &Self::Element,
        wanted: &[String],
    ) -> Result<Option<String>>;

    async fn close(&self) -> Result<()>;
}
