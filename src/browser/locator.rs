use std::fmt;
use std::path::{Path, PathBuf};

use eyre::Result;
use log::{debug, trace};
use thiserror::Error;

use crate::browser::template::{self, DEFAULT_THRESHOLD};
use crate::browser::{Browser, ElementSpec, Selector, Strategy};

/// What a successful lookup hands back.
#[derive(Debug, Clone)]
pub enum Target<E> {
    Element {
        element: E,
        strategy: Strategy,
    },
    /// A template hit, in screenshot pixels.
    Point {
        x: u32,
        y: u32,
        confidence: f32,
        template: PathBuf,
    },
}

impl<E> Target<E> {
    pub fn element(&self) -> Option<&E> {
        match self {
            Target::Element { element, .. } => Some(element),
            Target::Point { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MissReason {
    NoMatch,
    NotInteractable,
    TextMismatch,
    BelowThreshold(f32),
    Error(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NoMatch => f.write_str("no match"),
            MissReason::NotInteractable => f.write_str("only hidden or disabled matches"),
            MissReason::TextMismatch => f.write_str("matches lacked the expected text"),
            MissReason::BelowThreshold(t) => write!(f, "no template match scored {:.2}", t),
            MissReason::Error(e) => write!(f, "error: {}", e),
        }
    }
}

/// Every strategy for an element was tried and none produced an
/// interactable match.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{description} not found after {} strategies", attempts.len())]
pub struct NotFound {
    pub description: String,
    pub attempts: Vec<(Strategy, MissReason)>,
}

/// Runs an element's strategies in order and returns the first visible and
/// enabled match. A failing strategy is recorded and the next one is tried;
/// the lookup itself never errors.
#[derive(Debug, Clone)]
pub struct ElementLocator {
    threshold: f32,
}

impl Default for ElementLocator {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ElementLocator {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub async fn find<B: Browser>(
        &self,
        browser: &B,
        spec: &ElementSpec,
    ) -> Result<Target<B::Element>, NotFound> {
        self.find_from(browser, None, spec).await
    }

    /// Like `find`, scoped to the descendants of `parent`. Template
    /// strategies are skipped since a screenshot has no notion of scope.
    pub async fn find_in<B: Browser>(
        &self,
        browser: &B,
        parent: &B::Element,
        spec: &ElementSpec,
    ) -> Result<Target<B::Element>, NotFound> {
        self.find_from(browser, Some(parent), spec).await
    }

    async fn find_from<B: Browser>(
        &self,
        browser: &B,
        parent: Option<&B::Element>,
        spec: &ElementSpec,
    ) -> Result<Target<B::Element>, NotFound> {
        let mut attempts = Vec::with_capacity(spec.strategies.len());

        for strategy in &spec.strategies {
            let outcome = match (strategy, parent) {
                (Strategy::Css(s), _) => {
                    self.first_interactable(browser, parent, Selector::Css(s), spec)
                        .await
                }
                (Strategy::XPath(s), _) => {
                    self.first_interactable(browser, parent, Selector::XPath(s), spec)
                        .await
                }
                (Strategy::Template(path), None) => self.on_screen(browser, path).await,
                (Strategy::Template(_), Some(_)) => Err(MissReason::NoMatch),
            };

            match outcome {
                Ok(target) => {
                    debug!("found {} via {}", spec.description, strategy);
                    return Ok(target);
                }
                Err(reason) => {
                    trace!("{}: {} missed ({})", spec.description, strategy, reason);
                    attempts.push((strategy.clone(), reason));
                }
            }
        }

        debug!(
            "{} not found ({} strategies tried)",
            spec.description,
            attempts.len()
        );
        Err(NotFound {
            description: spec.description.clone(),
            attempts,
        })
    }

    /// Every interactable match of the first DOM strategy that has any.
    /// Used for repeated elements such as job cards and form inputs.
    pub async fn find_all<B: Browser>(&self, browser: &B, spec: &ElementSpec) -> Vec<B::Element> {
        for strategy in &spec.strategies {
            let selector = match strategy {
                Strategy::Css(s) => Selector::Css(s),
                Strategy::XPath(s) => Selector::XPath(s),
                Strategy::Template(_) => continue,
            };
            let Ok(candidates) = browser.find_all(selector).await else {
                continue;
            };

            let mut usable = Vec::new();
            for candidate in candidates {
                if self.accepts(browser, &candidate, spec).await.is_ok() {
                    usable.push(candidate);
                }
            }
            if !usable.is_empty() {
                debug!("{} x{} via {}", spec.description, usable.len(), strategy);
                return usable;
            }
        }
        Vec::new()
    }

    /// Clicks a lookup result, element or screen point alike.
    pub async fn click<B: Browser>(&self, browser: &B, target: &Target<B::Element>) -> Result<()> {
        match target {
            Target::Element { element, .. } => browser.click(element).await,
            Target::Point { x, y, .. } => browser.click_at(*x, *y).await,
        }
    }

    async fn first_interactable<B: Browser>(
        &self,
        browser: &B,
        parent: Option<&B::Element>,
        selector: Selector<'_>,
        spec: &ElementSpec,
    ) -> Result<Target<B::Element>, MissReason> {
        let candidates = match parent {
            Some(parent) => browser.find_within(parent, selector).await,
            None => browser.find_all(selector).await,
        }
        .map_err(|e| MissReason::Error(e.to_string()))?;

        if candidates.is_empty() {
            return Err(MissReason::NoMatch);
        }

        // report the most informative reason when every candidate fails
        let mut reason = MissReason::NotInteractable;
        for candidate in candidates {
            match self.accepts(browser, &candidate, spec).await {
                Ok(()) => {
                    return Ok(Target::Element {
                        element: candidate,
                        strategy: match selector {
                            Selector::Css(s) => Strategy::css(s),
                            Selector::XPath(s) => Strategy::xpath(s),
                        },
                    });
                }
                Err(MissReason::NotInteractable) => {}
                Err(other) => reason = other,
            }
        }
        Err(reason)
    }

    async fn accepts<B: Browser>(
        &self,
        browser: &B,
        element: &B::Element,
        spec: &ElementSpec,
    ) -> Result<(), MissReason> {
        match browser.is_interactable(element).await {
            Ok(true) => {}
            Ok(false) => return Err(MissReason::NotInteractable),
            Err(e) => return Err(MissReason::Error(e.to_string())),
        }

        let Some(needle) = &spec.must_contain else {
            return Ok(());
        };
        let text = browser.text(element).await.unwrap_or_default();
        let label = browser
            .attr(element, "aria-label")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        if text.to_lowercase().contains(needle) || label.to_lowercase().contains(needle) {
            Ok(())
        } else {
            Err(MissReason::TextMismatch)
        }
    }

    async fn on_screen<B: Browser>(
        &self,
        browser: &B,
        path: &Path,
    ) -> Result<Target<B::Element>, MissReason> {
        let needle = template::load_template(path).map_err(|e| MissReason::Error(e.to_string()))?;
        let png = browser
            .screenshot()
            .await
            .map_err(|e| MissReason::Error(e.to_string()))?;
        let haystack =
            template::decode_screenshot(&png).map_err(|e| MissReason::Error(e.to_string()))?;

        let threshold = self.threshold;
        let matches = tokio::task::spawn_blocking(move || {
            template::match_template(&haystack, &needle, threshold)
        })
        .await
        .map_err(|e| MissReason::Error(e.to_string()))?;

        // sorted best first
        let best = matches.first().ok_or(MissReason::BelowThreshold(threshold))?;
        let (x, y) = best.center();
        Ok(Target::Point {
            x,
            y,
            confidence: best.confidence,
            template: path.to_path_buf(),
        })
    }
}
