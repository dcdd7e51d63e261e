pub mod fields;
pub mod runner;

use std::time::{Duration, Instant};

use eyre::Result;
use log::{debug, error, info, warn};

use crate::browser::locator::{ElementLocator, NotFound, Target};
use crate::browser::{Browser, ElementSpec};
use crate::chat::analyzer::JobAnalyzer;
use crate::flow::fields::FieldCategory;
use crate::gate::{InterventionGate, Prompt, Verdict};
use crate::models::job::{ActionKind, ApplicationResult, JobListing, Outcome};
use crate::sites::{SiteDefinition, SiteKind};
use crate::utils::config::ConfigInner;
use crate::utils::report::Recorder;

/// Application limits of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub per_site: usize,
    pub per_day: usize,
    /// Applied outcomes already in today's reports from earlier runs.
    pub earlier_today: usize,
}

impl Budget {
    pub fn remaining(&self, site_applied: usize, run_applied: usize) -> usize {
        let site_left = self.per_site.saturating_sub(site_applied);
        let day_left = self
            .per_day
            .saturating_sub(self.earlier_today + run_applied);
        site_left.min(day_left)
    }
}

/// State shared by every site of a run. Only the current step of the single
/// control loop touches it.
pub struct Automation<'a, B: Browser> {
    pub browser: &'a B,
    pub config: &'a ConfigInner,
    pub locator: ElementLocator,
    pub gate: InterventionGate,
    pub analyzer: JobAnalyzer,
    pub recorder: Recorder,
    pub budget: Budget,
}

impl<'a, B: Browser> Automation<'a, B> {
    /// Applications `site` may still make in this run.
    pub fn remaining(&self, site: SiteKind) -> usize {
        self.budget
            .remaining(self.recorder.site_applied(site), self.recorder.applied())
    }

    /// Lets the page react after a navigation or click.
    pub async fn settle(&self) {
        if self.config.flow.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.flow.settle_ms)).await;
        }
    }

    /// Visible text of the first match of `spec`, if any.
    pub async fn text_of(&self, parent: Option<&B::Element>, spec: &ElementSpec) -> Option<String> {
        let target = match parent {
            Some(parent) => self.locator.find_in(self.browser, parent, spec).await,
            None => self.locator.find(self.browser, spec).await,
        }
        .ok()?;
        let text = self.browser.text(target.element()?).await.ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Steps of one application attempt.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Opening,
    Scanning,
    Assessing,
    LocatingApply,
    Filling(usize),
    Advancing(usize),
    NeedsHuman,
    Done(Outcome, String),
}

struct Attempt {
    job: JobListing,
    actions: Vec<String>,
    ai_confidence: Option<f32>,
}

/// Walks one listing from opening it to a terminal outcome.
pub struct ApplicationFlow<'r, 'a, B: Browser> {
    run: &'r mut Automation<'a, B>,
    site: &'r SiteDefinition,
}

impl<'r, 'a, B: Browser> ApplicationFlow<'r, 'a, B> {
    pub fn new(run: &'r mut Automation<'a, B>, site: &'r SiteDefinition) -> Self {
        Self { run, site }
    }

    /// Never fails: anything unexpected inside the attempt becomes a
    /// `Failed` result.
    pub async fn apply(&mut self, job: JobListing) -> ApplicationResult {
        let started = Instant::now();
        info!("applying to {} ({})", job, job.url);

        let mut attempt = Attempt {
            job,
            actions: Vec::new(),
            ai_confidence: None,
        };
        let (outcome, reason) = match self.drive(&mut attempt).await {
            Ok(end) => end,
            Err(e) => {
                error!("{} failed: {}", attempt.job, e);
                (Outcome::Failed, format!("error: {}", e))
            }
        };

        if outcome.is_success() {
            info!("{}: {}", attempt.job, outcome);
        } else {
            info!("{}: {} ({})", attempt.job, outcome, reason);
        }

        ApplicationResult {
            counted: outcome == Outcome::Applied,
            job: attempt.job,
            outcome,
            reason,
            actions: attempt.actions,
            elapsed_secs: started.elapsed().as_secs_f64(),
            ai_confidence: attempt.ai_confidence,
        }
    }

    async fn drive(&mut self, attempt: &mut Attempt) -> Result<(Outcome, String)> {
        let mut step = Step::Opening;
        loop {
            debug!("{}: {:?}", attempt.job, step);
            step = match step {
                Step::Done(outcome, reason) => return Ok((outcome, reason)),
                other => self.advance(other, attempt).await?,
            };
        }
    }

    async fn advance(&mut self, step: Step, attempt: &mut Attempt) -> Result<Step> {
        let max_steps = self.run.config.flow.max_form_steps;

        let next = match step {
            Step::Opening => {
                self.run.browser.navigate(&attempt.job.url).await?;
                self.run.settle().await;
                attempt.actions.push(format!("open {}", attempt.job.url));
                self.after_gate(Step::Scanning).await?
            }
            Step::Scanning => {
                self.scan(&mut attempt.job).await;
                Step::Assessing
            }
            Step::Assessing => self.assess(attempt).await,
            Step::LocatingApply => match self.locate(&self.site.apply).await {
                Err(not_found) => {
                    debug!("{}", not_found);
                    Step::Done(Outcome::Skipped, "no apply control".to_string())
                }
                Ok(target) => {
                    if let Target::Point { template, confidence, .. } = &target {
                        debug!(
                            "apply control matched {} at {:.2}",
                            template.display(),
                            confidence
                        );
                    }
                    self.run.locator.click(self.run.browser, &target).await?;
                    self.run.settle().await;
                    attempt.actions.push(ActionKind::Click.describe(&self.site.apply.description));
                    self.after_gate(Step::Filling(0)).await?
                }
            },
            Step::Filling(n) => {
                self.fill_form(attempt).await;
                Step::Advancing(n)
            }
            Step::Advancing(n) => {
                if let Ok(submit) = self.locate(&self.site.submit).await {
                    self.run.locator.click(self.run.browser, &submit).await?;
                    self.run.settle().await;
                    attempt.actions.push(ActionKind::Click.describe(&self.site.submit.description));
                    self.dismiss().await;
                    Step::Done(Outcome::Applied, "submitted".to_string())
                } else if n + 1 >= max_steps {
                    debug!("form step budget of {} used up", max_steps);
                    Step::NeedsHuman
                } else if let Ok(next) = self.locate(&self.site.next).await {
                    self.run.locator.click(self.run.browser, &next).await?;
                    self.run.settle().await;
                    attempt.actions.push(ActionKind::Click.describe(&self.site.next.description));
                    self.after_gate(Step::Filling(n + 1)).await?
                } else {
                    Step::NeedsHuman
                }
            }
            Step::NeedsHuman => self.hand_over(attempt).await,
            done @ Step::Done(..) => done,
        };

        Ok(next)
    }

    async fn locate(&self, spec: &ElementSpec) -> Result<Target<B::Element>, NotFound> {
        self.run.locator.find(self.run.browser, spec).await
    }

    /// `next`, unless the page now needs a human who declines.
    async fn after_gate(&mut self, next: Step) -> Result<Step> {
        Ok(match self.run.gate.checkpoint(self.run.browser).await? {
            Verdict::Proceed => next,
            Verdict::Declined(intervention) => {
                Step::Done(Outcome::Blocked, format!("blocked: {}", intervention))
            }
        })
    }

    /// Fills in what the detail page shows; missing parts keep their
    /// placeholders.
    async fn scan(&self, job: &mut JobListing) {
        if let Some(title) = self.run.text_of(None, &self.site.detail_title).await {
            job.title = title;
        }
        if let Some(company) = self.run.text_of(None, &self.site.detail_company).await {
            job.company = company;
        }
        if let Some(description) = self.run.text_of(None, &self.site.detail_description).await {
            job.description = description;
        }
    }

    async fn assess(&self, attempt: &mut Attempt) -> Step {
        let settings = &self.run.config.analyzer;
        if !settings.enabled {
            return Step::LocatingApply;
        }

        let score = self
            .run
            .analyzer
            .score(&attempt.job, &self.run.config.profile)
            .await;
        attempt.ai_confidence = Some(score.compatibility_score);

        if settings.skip_unsuitable && !score.should_apply {
            return Step::Done(
                Outcome::Skipped,
                format!(
                    "not a match ({:.0}%): {}",
                    score.compatibility_score * 100.0,
                    score.reasoning
                ),
            );
        }
        Step::LocatingApply
    }

    async fn fill_form(&self, attempt: &mut Attempt) {
        let fields = self
            .run
            .locator
            .find_all(self.run.browser, &self.site.form_fields)
            .await;

        for element in fields {
            if let Err(e) = self.fill_field(&element, attempt).await {
                debug!("field left untouched: {}", e);
            }
        }
    }

    async fn fill_field(&self, element: &B::Element, attempt: &mut Attempt) -> Result<()> {
        let browser = self.run.browser;
        let profile = &self.run.config.profile;
        let field = browser.describe_field(element).await?;
        let caption = field.caption().to_string();
        let category = fields::classify(&field);

        if field.is_file() {
            if category == Some(FieldCategory::Resume)
                && let Some(path) = self.resume_path()
            {
                browser.fill(element, &path).await?;
                attempt.actions.push(format!("upload resume to {}", caption));
            }
            return Ok(());
        }

        if field.is_select() {
            let wanted = match category {
                Some(category) => category.select_candidates(profile),
                None => self.suggested_answers(&caption, &attempt.job).await,
            };
            if !wanted.is_empty()
                && let Some(option) = browser.select_option(element, &wanted).await?
            {
                attempt
                    .actions
                    .push(format!("{} {}: {}", ActionKind::Select, caption, option));
            }
            return Ok(());
        }

        // prefilled values are the site's (or the operator's) choice
        if !field.is_typeable() || !field.value.trim().is_empty() {
            return Ok(());
        }

        let value = match category {
            Some(FieldCategory::CoverLetter) => self.cover_letter(&attempt.job).await,
            Some(category) => category.value(profile),
            None => self.suggested_answers(&caption, &attempt.job).await.into_iter().next(),
        };
        if let Some(value) = value {
            browser.fill(element, &value).await?;
            attempt.actions.push(ActionKind::Fill.describe(&caption));
        }
        Ok(())
    }

    async fn cover_letter(&self, job: &JobListing) -> Option<String> {
        let profile = &self.run.config.profile;
        if let Some(letter) = FieldCategory::CoverLetter.value(profile) {
            return Some(letter);
        }
        if self.run.config.analyzer.enabled {
            return Some(self.run.analyzer.draft(job, profile).await);
        }
        None
    }

    /// Model answers for a field the static map does not cover, best first.
    /// Empty unless the model is confident enough to fill it.
    async fn suggested_answers(&self, caption: &str, job: &JobListing) -> Vec<String> {
        let settings = &self.run.config.analyzer;
        if !settings.answer_fields || !self.run.analyzer.is_online() || caption.is_empty() {
            return Vec::new();
        }

        let Some(decision) = self
            .run
            .analyzer
            .decide_field(caption, job, &self.run.config.profile)
            .await
        else {
            return Vec::new();
        };
        match decision.action {
            ActionKind::Fill | ActionKind::Select
                if decision.confidence >= settings.min_decision_confidence =>
            {
                decision.answers()
            }
            ActionKind::Skip => {
                debug!("model chose to leave {:?} alone", caption);
                Vec::new()
            }
            action => {
                debug!(
                    "ignoring {:?} for {:?} at {:.2} confidence",
                    action, caption, decision.confidence
                );
                Vec::new()
            }
        }
    }

    fn resume_path(&self) -> Option<String> {
        let path = self.run.config.profile.resume_path.as_ref()?;
        match std::fs::canonicalize(path) {
            Ok(absolute) => Some(absolute.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("resume {} unusable: {}", path.display(), e);
                None
            }
        }
    }

    /// Closes the post-submit confirmation, if there is one.
    async fn dismiss(&self) {
        if let Ok(target) = self.run.locator.find(self.run.browser, &self.site.dismiss).await
            && let Err(e) = self.run.locator.click(self.run.browser, &target).await
        {
            debug!("could not dismiss confirmation: {}", e);
        }
    }

    async fn hand_over(&self, attempt: &mut Attempt) -> Step {
        let prompt = Prompt::new(
            "Complex application",
            format!(
                "{}\n{}\nThe form could not be completed automatically. Finish and submit it in the browser, then continue, or give up to move on.",
                attempt.job, attempt.job.url
            ),
        );
        attempt.actions.push("handed to operator".to_string());

        if !self.run.gate.acknowledge(&prompt).await {
            return Step::Done(Outcome::Declined, "operator declined complex form".to_string());
        }
        if self.run.config.intervention.optimistic_manual_success {
            Step::Done(Outcome::Applied, "completed by operator".to_string())
        } else {
            Step::Done(Outcome::CompletedByHuman, "completed by operator".to_string())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::browser::fake::FakeBrowser;
    use crate::gate::default_indicators;
    use crate::gate::prompt::ScriptedGate;

    /// Default config without any waiting.
    pub fn quiet_config() -> ConfigInner {
        let mut config = ConfigInner::default();
        config.flow.settle_ms = 0;
        config.flow.between_jobs_secs = [0, 0];
        config
    }

    pub fn automation<'a>(
        browser: &'a FakeBrowser,
        config: &'a ConfigInner,
        human: ScriptedGate,
        analyzer: JobAnalyzer,
    ) -> Automation<'a, FakeBrowser> {
        Automation {
            browser,
            config,
            locator: ElementLocator::default(),
            gate: InterventionGate::new(default_indicators(), Box::new(human), None),
            analyzer,
            recorder: Recorder::new(),
            budget: Budget {
                per_site: config.limits.max_applications_per_site,
                per_day: config.limits.max_applications_per_day,
                earlier_today: 0,
            },
        }
    }

    /// A run with the heuristic analyzer and a gate giving `answers`.
    pub fn offline_run<'a>(
        browser: &'a FakeBrowser,
        config: &'a ConfigInner,
        answers: &[bool],
    ) -> Automation<'a, FakeBrowser> {
        automation(
            browser,
            config,
            ScriptedGate::answering(answers),
            JobAnalyzer::offline(0.3),
        )
    }
}
