//! Scripted in-memory browser for tests.
//!
//! Pages are registered under a URL prefix; the page shown is the one with
//! the longest prefix of the current URL. Elements match a selector when the
//! exact selector string is in their list, so tests can use the real site
//! tables. Every state-changing call is appended to an action log.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use eyre::{Result, eyre};

use crate::browser::{Browser, FieldDescriptor, Selector};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub id: String,
    selectors: Vec<String>,
    text: String,
    attrs: BTreeMap<String, String>,
    hidden: bool,
    disabled: bool,
    parent: Option<String>,
    navigates_to: Option<String>,
    field: Option<FieldDescriptor>,
    options: Vec<String>,
}

impl FakeElement {
    pub fn new(id: &str, selectors: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// A labelled form control; `input_type` "select" and "textarea" pick
    /// the tag instead. Give it selectors with `also`.
    pub fn input(id: &str, input_type: &str, name: &str, label: &str) -> Self {
        let tag = match input_type {
            "select" => "select",
            "textarea" => "textarea",
            _ => "input",
        };
        let mut element = Self::new(id, &[]);
        element.field = Some(FieldDescriptor {
            tag: tag.to_string(),
            input_type: if tag == "input" { input_type.to_string() } else { String::new() },
            name: name.to_string(),
            id: id.to_string(),
            label: label.to_string(),
            ..Default::default()
        });
        element
    }

    pub fn also(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn inside(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Clicking moves the browser to `url`.
    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    text: String,
    elements: Vec<FakeElement>,
    screenshot: Option<Vec<u8>>,
}

impl Page {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(png);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    pages: BTreeMap<String, Page>,
    url: String,
    actions: Vec<String>,
    values: BTreeMap<String, String>,
}

impl State {
    fn page_key(&self) -> Option<String> {
        self.pages
            .keys()
            .filter(|prefix| self.url.starts_with(prefix.as_str()))
            .max_by_key(|prefix| prefix.len())
            .cloned()
    }

    fn page(&self) -> Option<&Page> {
        self.page_key().and_then(|k| self.pages.get(&k))
    }

    fn element(&self, id: &str) -> Result<FakeElement> {
        self.page()
            .and_then(|p| p.elements.iter().find(|e| e.id == id))
            .cloned()
            .ok_or_else(|| eyre!("stale element reference: {}", id))
    }
}

/// Cloning shares the underlying state, so scripted gates can change pages
/// while the code under test holds the browser.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser(Arc<Mutex<State>>);

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_page(&self, prefix: &str, page: Page) {
        self.lock().pages.insert(prefix.to_string(), page);
    }

    /// Replaces the visible text of the page registered under `prefix`.
    pub fn set_text(&self, prefix: &str, text: &str) {
        if let Some(page) = self.lock().pages.get_mut(prefix) {
            page.text = text.to_string();
        }
    }

    /// Adds a marker to the action log, for ordering assertions.
    pub fn note(&self, marker: &str) {
        self.lock().actions.push(format!("note {}", marker));
    }

    pub fn actions(&self) -> Vec<String> {
        self.lock().actions.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.actions().iter().filter(|a| a.starts_with(prefix)).count()
    }

    pub fn value(&self, id: &str) -> Option<String> {
        self.lock().values.get(id).cloned()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Element = FakeElement;

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(format!("navigate {}", url));
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.lock().page().map(|p| p.text.clone()).unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.lock()
            .page()
            .and_then(|p| p.screenshot.clone())
            .ok_or_else(|| eyre!("no screenshot scripted"))
    }

    async fn find_all(&self, selector: Selector<'_>) -> Result<Vec<FakeElement>> {
        let wanted = match selector {
            Selector::Css(s) | Selector::XPath(s) => s,
        };
        let state = self.lock();
        Ok(state
            .page()
            .map(|p| {
                p.elements
                    .iter()
                    .filter(|e| e.selectors.iter().any(|s| s == wanted))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_within(
        &self,
        parent: &FakeElement,
        selector: Selector<'_>,
    ) -> Result<Vec<FakeElement>> {
        Ok(self
            .find_all(selector)
            .await?
            .into_iter()
            .filter(|e| e.parent.as_deref() == Some(parent.id.as_str()))
            .collect())
    }

    async fn is_interactable(&self, element: &FakeElement) -> Result<bool> {
        let current = self.lock().element(&element.id)?;
        Ok(!current.hidden && !current.disabled)
    }

    async fn text(&self, element: &FakeElement) -> Result<String> {
        Ok(self.lock().element(&element.id)?.text)
    }

    async fn attr(&self, element: &FakeElement, name: &str) -> Result<Option<String>> {
        Ok(self.lock().element(&element.id)?.attrs.get(name).cloned())
    }

    async fn link(&self, element: &FakeElement) -> Result<Option<String>> {
        self.attr(element, "href").await
    }

    async fn describe_field(&self, element: &FakeElement) -> Result<FieldDescriptor> {
        let state = self.lock();
        let current = state.element(&element.id)?;
        let mut field = current.field.unwrap_or_default();
        field.value = state.values.get(&element.id).cloned().unwrap_or_default();
        Ok(field)
    }

    async fn click(&self, element: &FakeElement) -> Result<()> {
        let mut state = self.lock();
        let current = state.element(&element.id)?;
        state.actions.push(format!("click {}", current.id));
        if let Some(url) = current.navigates_to {
            state.url = url;
        }
        Ok(())
    }

    async fn click_at(&self, x: u32, y: u32) -> Result<()> {
        self.lock().actions.push(format!("click_at {},{}", x, y));
        Ok(())
    }

    async fn fill(&self, element: &FakeElement, value: &str) -> Result<()> {
        let mut state = self.lock();
        state.element(&element.id)?;
        state.actions.push(format!("fill {}={}", element.id, value));
        state.values.insert(element.id.clone(), value.to_string());
        Ok(())
    }

    async fn select_option(
        &self,
        element: &FakeElement,
        wanted: &[String],
    ) -> Result<Option<String>> {
        let mut state = self.lock();
        let current = state.element(&element.id)?;
        let chosen = wanted.iter().find_map(|w| {
            let w = w.to_lowercase();
            current
                .options
                .iter()
                .find(|o| o.to_lowercase().contains(&w))
                .cloned()
        });
        if let Some(option) = &chosen {
            state.actions.push(format!("select {}={}", element.id, option));
            state.values.insert(element.id.clone(), option.clone());
        }
        Ok(chosen)
    }

    async fn close(&self) -> Result<()> {
        self.lock().actions.push("close".to_string());
        Ok(())
    }
}
