use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::browser::Browser;
use crate::browser::locator::Target;
use crate::flow::{ApplicationFlow, Automation};
use crate::gate::{GateState, Intervention, Prompt, Verdict};
use crate::models::job::{ApplicationResult, JobListing, Outcome};
use crate::sites::{LoginPage, SiteDefinition, SiteKind};
use crate::utils::config::SiteConfig;
use crate::utils::report::{RunReport, write_report};

/// Errors that end one site's run. Other sites still get their turn.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("{0}: login failed: {1}")]
    LoginFailed(SiteKind, String),
    #[error("{0}: blocked: {1}")]
    Blocked(SiteKind, String),
    #[error("{0}: browser error: {1}")]
    Browser(SiteKind, String),
}

fn browser_error(site: SiteKind) -> impl Fn(eyre::Report) -> SiteError {
    move |e| SiteError::Browser(site, e.to_string())
}

/// Logs into one site and works through its search results.
pub struct SiteRunner<'r, 'a, B: Browser> {
    run: &'r mut Automation<'a, B>,
    site: SiteDefinition,
    credentials: Option<(String, String)>,
    seen: HashSet<String>,
}

impl<'r, 'a, B: Browser> SiteRunner<'r, 'a, B> {
    pub fn new(
        run: &'r mut Automation<'a, B>,
        site: SiteDefinition,
        credentials: Option<(String, String)>,
    ) -> Self {
        Self {
            run,
            site,
            credentials,
            seen: HashSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<(), SiteError> {
        self.login().await?;
        self.search().await
    }

    /// `Some` when the page is blocked and the operator gave up.
    async fn blocked(&mut self) -> Result<Option<Intervention>, SiteError> {
        let verdict = self
            .run
            .gate
            .checkpoint(self.run.browser)
            .await
            .map_err(browser_error(self.site.kind))?;
        Ok(match verdict {
            Verdict::Proceed => None,
            Verdict::Declined(intervention) => Some(intervention),
        })
    }

    async fn login(&mut self) -> Result<(), SiteError> {
        let kind = self.site.kind;
        let Some(login) = self.site.login.clone() else {
            return Ok(());
        };
        let browser = self.run.browser;
        let failed = |reason: String| SiteError::LoginFailed(kind, reason);

        info!("{}: opening sign-in page", kind);
        browser.navigate(&login.url).await.map_err(browser_error(kind))?;
        self.run.settle().await;
        if let Some(intervention) = self.blocked().await? {
            return Err(failed(format!("blocked: {}", intervention)));
        }

        let email = self.run.locator.find(browser, &login.email).await;
        let password = self.run.locator.find(browser, &login.password).await;
        if email.is_err() && password.is_err() {
            info!("{}: no sign-in form, assuming an existing session", kind);
            return Ok(());
        }

        let Some((user, pass)) = self.credentials.clone() else {
            return self.manual_login(kind).await;
        };

        let email = email.map_err(|e| failed(e.to_string()))?;
        self.type_into(&email, &user).await?;

        let password = match password {
            Ok(field) => field,
            Err(_) => self.reveal_password(&login).await?,
        };
        self.type_into(&password, &pass).await?;

        let submit = self
            .run
            .locator
            .find(browser, &login.submit)
            .await
            .map_err(|e| failed(e.to_string()))?;
        self.run
            .locator
            .click(browser, &submit)
            .await
            .map_err(browser_error(kind))?;
        self.run.settle().await;

        if let Some(intervention) = self.blocked().await? {
            return Err(failed(format!("blocked: {}", intervention)));
        }
        // still looking at the password box
        if self.run.locator.find(browser, &login.password).await.is_ok() {
            return Err(failed("credentials rejected".to_string()));
        }

        info!("{}: signed in", kind);
        Ok(())
    }

    /// Email-first forms only show the password after a continue button.
    async fn reveal_password(
        &mut self,
        login: &LoginPage,
    ) -> Result<Target<B::Element>, SiteError> {
        let kind = self.site.kind;
        let browser = self.run.browser;

        let next = self
            .run
            .locator
            .find(browser, &login.continue_button)
            .await
            .map_err(|e| SiteError::LoginFailed(kind, e.to_string()))?;
        self.run
            .locator
            .click(browser, &next)
            .await
            .map_err(browser_error(kind))?;
        self.run.settle().await;

        if let Some(intervention) = self.blocked().await? {
            return Err(SiteError::LoginFailed(kind, format!("blocked: {}", intervention)));
        }
        self.run
            .locator
            .find(browser, &login.password)
            .await
            .map_err(|e| SiteError::LoginFailed(kind, e.to_string()))
    }

    async fn type_into(&self, target: &Target<B::Element>, value: &str) -> Result<(), SiteError> {
        let kind = self.site.kind;
        let Some(element) = target.element() else {
            return Err(SiteError::LoginFailed(
                kind,
                "sign-in field only matched a screenshot template".to_string(),
            ));
        };
        self.run
            .browser
            .fill(element, value)
            .await
            .map_err(browser_error(kind))
    }

    async fn manual_login(&mut self, kind: SiteKind) -> Result<(), SiteError> {
        warn!("{}: no credentials in the environment, asking the operator", kind);
        let prompt = Prompt::new(
            format!("Sign in to {}", kind),
            format!(
                "No credentials are configured for {}. Sign in using the browser window, then continue.",
                kind
            ),
        );
        if !self.run.gate.acknowledge(&prompt).await {
            return Err(SiteError::LoginFailed(kind, "operator did not sign in".to_string()));
        }
        if let Some(intervention) = self.blocked().await? {
            return Err(SiteError::LoginFailed(kind, format!("blocked: {}", intervention)));
        }
        Ok(())
    }

    async fn search(&mut self) -> Result<(), SiteError> {
        let kind = self.site.kind;
        let config = self.run.config;
        let search = &config.search;

        for keyword in &search.keywords {
            for location in &search.locations {
                if self.run.remaining(kind) == 0 {
                    info!("{}: application limit reached", kind);
                    return Ok(());
                }
                let url = self
                    .site
                    .search_url(keyword, location, search.experience_level.as_deref())
                    .map_err(browser_error(kind))?;
                info!("{}: searching {:?} in {:?}", kind, keyword, location);
                self.results(&url).await?;
            }
        }
        Ok(())
    }

    async fn results(&mut self, url: &str) -> Result<(), SiteError> {
        let kind = self.site.kind;
        let browser = self.run.browser;
        let max_pages = self.run.config.flow.max_pages;

        browser.navigate(url).await.map_err(browser_error(kind))?;
        self.run.settle().await;
        if let Some(intervention) = self.blocked().await? {
            return Err(SiteError::Blocked(kind, intervention.to_string()));
        }

        for page in 1..=max_pages {
            if self.run.remaining(kind) == 0 {
                return Ok(());
            }

            let page_url = browser.current_url().await.map_err(browser_error(kind))?;
            let jobs = self.scrape_cards().await;
            info!("{}: {} listings on page {}", kind, jobs.len(), page);
            self.run.recorder.found(kind, jobs.len());

            for job in jobs {
                if self.run.remaining(kind) == 0 {
                    info!("{}: application limit reached", kind);
                    return Ok(());
                }
                self.attempt(job).await?;
            }

            if page == max_pages || !self.next_page(&page_url).await? {
                break;
            }
        }
        Ok(())
    }

    async fn attempt(&mut self, job: JobListing) -> Result<(), SiteError> {
        let kind = self.site.kind;

        if !self.seen.insert(job.url.clone()) {
            debug!("{}: already attempted {}", kind, job.url);
            return Ok(());
        }

        if let Some(term) = self.excluded_term(&job) {
            info!("{}: skipping {} (excluded term {:?})", kind, job, term);
            self.run.recorder.record(
                kind,
                ApplicationResult {
                    reason: format!("excluded term {:?}", term),
                    job,
                    outcome: Outcome::Skipped,
                    counted: false,
                    actions: Vec::new(),
                    elapsed_secs: 0.0,
                    ai_confidence: None,
                },
            );
            return Ok(());
        }

        let result = ApplicationFlow::new(self.run, &self.site).apply(job).await;
        let blocked = (result.outcome == Outcome::Blocked).then(|| result.reason.clone());
        self.run.recorder.record(kind, result);

        if let Some(reason) = blocked {
            return Err(SiteError::Blocked(kind, reason));
        }
        self.pause().await;
        Ok(())
    }

    /// Listings on the current results page, in page order. Cards without a
    /// link are dropped.
    async fn scrape_cards(&self) -> Vec<JobListing> {
        let browser = self.run.browser;
        let cards = self.run.locator.find_all(browser, &self.site.job_cards).await;
        let mut jobs = Vec::new();

        for card in cards
            .iter()
            .take(self.run.config.flow.max_listings_per_page)
        {
            let link = match self.run.locator.find_in(browser, card, &self.site.card_link).await {
                Ok(Target::Element { element, .. }) => browser.link(&element).await,
                _ => browser.link(card).await,
            };
            let Ok(Some(url)) = link else {
                debug!("card without a link, skipping");
                continue;
            };

            let mut job = JobListing::new(self.site.kind, url);
            if let Some(title) = self.run.text_of(Some(card), &self.site.card_title).await {
                job.title = title;
            }
            if let Some(company) = self.run.text_of(Some(card), &self.site.card_company).await {
                job.company = company;
            }
            job.location = self.run.text_of(Some(card), &self.site.card_location).await;
            jobs.push(job);
        }
        jobs
    }

    fn excluded_term(&self, job: &JobListing) -> Option<String> {
        let haystack = job.searchable_text().to_lowercase();
        self.run
            .config
            .search
            .exclude
            .iter()
            .find(|term| !term.trim().is_empty() && haystack.contains(&term.to_lowercase()))
            .cloned()
    }

    /// Returns to the results page and clicks through to the next one.
    /// `false` when there is none.
    async fn next_page(&mut self, page_url: &str) -> Result<bool, SiteError> {
        let kind = self.site.kind;
        let browser = self.run.browser;

        browser.navigate(page_url).await.map_err(browser_error(kind))?;
        self.run.settle().await;
        if let Some(intervention) = self.blocked().await? {
            return Err(SiteError::Blocked(kind, intervention.to_string()));
        }

        let Ok(next) = self.run.locator.find(browser, &self.site.next_page).await else {
            info!("{}: no more result pages", kind);
            return Ok(false);
        };
        self.run
            .locator
            .click(browser, &next)
            .await
            .map_err(browser_error(kind))?;
        self.run.settle().await;

        if let Some(intervention) = self.blocked().await? {
            return Err(SiteError::Blocked(kind, intervention.to_string()));
        }
        Ok(true)
    }

    async fn pause(&self) {
        let [min, max] = self.run.config.flow.between_jobs_secs;
        let secs = fastrand::u64(min..=max.max(min));
        if secs > 0 {
            debug!("waiting {}s before the next listing", secs);
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }
}

/// Runs every enabled site in priority order, restricted to `only` when it
/// is not empty. Site failures are recorded and the next site runs.
pub async fn run_sites<B: Browser>(run: &mut Automation<'_, B>, only: &[SiteKind]) {
    let config = run.config;
    let mut sites: Vec<&SiteConfig> = config
        .sites
        .iter()
        .filter(|s| s.enabled && (only.is_empty() || only.contains(&s.name)))
        .collect();
    sites.sort_by_key(|s| s.priority);

    if sites.is_empty() {
        warn!("no enabled sites to run");
    }

    for site_config in sites {
        let kind = site_config.name;
        if run.remaining(kind) == 0 {
            info!("{}: daily application limit reached, skipping", kind);
            continue;
        }

        let definition = match SiteDefinition::with_overrides(kind, &site_config.selectors) {
            Ok(d) => d,
            Err(e) => {
                error!("{}: {}", kind, e);
                run.recorder.error(kind, e.to_string());
                continue;
            }
        };

        info!("{}: starting", kind);
        run.recorder.begin_site(kind);
        let started = Instant::now();

        let credentials = site_config.credentials();
        let outcome = SiteRunner::new(run, definition, credentials).run().await;
        if let Err(e) = outcome {
            error!("{}", e);
            run.recorder.error(kind, e.to_string());
        }
        if let GateState::Paused(intervention) = run.gate.state() {
            warn!("{}: left behind a blocked page ({})", kind, intervention);
        }

        run.recorder.finish_site(kind, started.elapsed().as_secs_f64());
        info!(
            "{}: finished with {} applications",
            kind,
            run.recorder.site_applied(kind)
        );
    }
}

/// Runs the sites until they are done or `shutdown` resolves. Either way the
/// session is closed and the report written before returning.
pub async fn run_until<B: Browser>(
    run: &mut Automation<'_, B>,
    only: &[SiteKind],
    shutdown: impl Future<Output = ()>,
) -> RunReport {
    let interrupted = tokio::select! {
        biased;
        _ = shutdown => {
            warn!("interrupted, wrapping up");
            true
        }
        _ = run_sites(run, only) => false,
    };

    if let Err(e) = run.browser.close().await {
        warn!("could not close the browser session: {}", e);
    }

    let report = run.recorder.finish(interrupted);
    if let Err(e) = write_report(&run.config.output.dir, &report) {
        error!("could not write results: {}", e);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeBrowser, FakeElement, Page};
    use crate::chat::analyzer::JobAnalyzer;
    use crate::chat::backend::ScriptedBackend;
    use crate::chat::heuristic;
    use crate::flow::testing::{automation, offline_run, quiet_config};
    use crate::gate::prompt::ScriptedGate;
    use crate::utils::config::ConfigInner;

    const SEARCH: &str = "https://www.linkedin.com/jobs/search/";
    const LOGIN: &str = "https://www.linkedin.com/login";
    const FEED: &str = "https://www.linkedin.com/feed/";
    const CARD: &str = ".jobs-search-results__list-item";
    const CARD_LINK: &str = "a.job-card-list__title";
    const CARD_TITLE: &str = ".job-card-list__title";
    const SUBMIT: &str = "button[aria-label*='Submit']";
    const EASY_APPLY: &str = "//button[contains(@aria-label, 'Easy Apply')]";
    const NEXT_PAGE: &str = "//button[@aria-label='View next page']";

    fn job_url(n: u32) -> String {
        format!("https://www.linkedin.com/jobs/view/{}", n)
    }

    /// A results page listing `jobs` as (id, title).
    fn results(jobs: &[(u32, &str)]) -> Page {
        jobs.iter().fold(Page::new("Jobs you may be interested in"), |page, (n, title)| {
            let card = format!("card{}", n);
            page.with(FakeElement::new(&card, &[CARD]))
                .with(
                    FakeElement::new(&format!("link{}", n), &[CARD_LINK])
                        .inside(&card)
                        .attr("href", &job_url(*n)),
                )
                .with(
                    FakeElement::new(&format!("title{}", n), &[CARD_TITLE])
                        .inside(&card)
                        .text(title),
                )
        })
    }

    fn easy_apply_posting() -> Page {
        Page::new("Rust Engineer")
            .with(FakeElement::new("apply", &[EASY_APPLY]).text("Easy Apply"))
            .with(FakeElement::new("submit", &[SUBMIT]))
    }

    fn single_search(config: &mut ConfigInner) {
        config.search.keywords = vec!["Rust".to_string()];
        config.search.locations = vec!["Remote".to_string()];
        config.search.experience_level = None;
    }

    fn linkedin() -> SiteDefinition {
        let mut site = SiteDefinition::builtin(SiteKind::LinkedIn);
        site.login = None;
        site
    }

    fn applied(run: &Automation<'_, FakeBrowser>) -> Vec<Outcome> {
        run.recorder
            .finish(false)
            .sites
            .iter()
            .flat_map(|s| s.results.iter().map(|r| r.outcome))
            .collect()
    }

    #[tokio::test]
    async fn stops_at_the_application_limit() {
        let browser = FakeBrowser::new();
        browser.add_page(SEARCH, results(&[(1, "Rust Engineer"), (2, "Rust Developer")]));
        browser.add_page(&job_url(1), easy_apply_posting());
        browser.add_page(&job_url(2), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        config.limits.max_applications_per_site = 1;
        let mut run = offline_run(&browser, &config, &[]);

        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();

        assert_eq!(applied(&run), vec![Outcome::Applied]);
        assert_eq!(run.recorder.site_applied(SiteKind::LinkedIn), 1);
        assert_eq!(browser.count(&format!("navigate {}", job_url(2))), 0);
    }

    #[tokio::test]
    async fn zero_budget_opens_nothing() {
        let browser = FakeBrowser::new();
        browser.add_page(SEARCH, results(&[(1, "Rust Engineer")]));
        browser.add_page(&job_url(1), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        config.limits.max_applications_per_day = 3;
        let mut run = offline_run(&browser, &config, &[]);
        run.budget.earlier_today = 3;

        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();
        assert!(applied(&run).is_empty());
        assert!(browser.actions().is_empty());
    }

    #[tokio::test]
    async fn listing_without_apply_control_is_skipped_and_the_next_one_runs() {
        let browser = FakeBrowser::new();
        browser.add_page(SEARCH, results(&[(1, "Rust Engineer"), (2, "Rust Developer")]));
        browser.add_page(&job_url(1), Page::new("Apply on company website"));
        browser.add_page(&job_url(2), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        let mut run = offline_run(&browser, &config, &[]);

        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();

        assert_eq!(applied(&run), vec![Outcome::Skipped, Outcome::Applied]);
        assert_eq!(run.recorder.site_applied(SiteKind::LinkedIn), 1);
        let report = run.recorder.finish(false);
        assert_eq!(report.sites[0].results[0].reason, "no apply control");
        assert_eq!(report.sites[0].jobs_found, 2);
    }

    #[tokio::test]
    async fn excluded_and_repeated_listings_are_not_opened() {
        let browser = FakeBrowser::new();
        browser.add_page(
            SEARCH,
            results(&[(1, "Unpaid Rust Internship"), (2, "Rust Engineer")]),
        );
        browser.add_page(&job_url(2), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        // both locations list the same postings
        config.search.locations = vec!["Remote".to_string(), "Berlin".to_string()];
        config.search.exclude = vec!["unpaid".to_string()];
        let mut run = offline_run(&browser, &config, &[]);

        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();

        assert_eq!(applied(&run), vec![Outcome::Skipped, Outcome::Applied]);
        assert_eq!(browser.count(&format!("navigate {}", job_url(1))), 0);
        assert_eq!(browser.count(&format!("navigate {}", job_url(2))), 1);
    }

    #[tokio::test]
    async fn follows_next_page_until_there_is_none() {
        let browser = FakeBrowser::new();
        let page2 = format!("{}?page=2", SEARCH);
        browser.add_page(
            SEARCH,
            results(&[(1, "Rust Engineer")])
                .with(FakeElement::new("more", &[NEXT_PAGE]).navigates_to(&page2)),
        );
        browser.add_page(&page2, results(&[(2, "Rust Developer")]));
        browser.add_page(&job_url(1), easy_apply_posting());
        browser.add_page(&job_url(2), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        let mut run = offline_run(&browser, &config, &[]);

        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();

        assert_eq!(applied(&run), vec![Outcome::Applied, Outcome::Applied]);
        assert_eq!(browser.count("click more"), 1);
        assert_eq!(browser.count(&format!("navigate {}", page2)), 1);
    }

    #[tokio::test]
    async fn captcha_on_login_waits_and_rechecks() {
        let browser = FakeBrowser::new();
        browser.add_page(
            LOGIN,
            Page::new("Security check: please complete the captcha")
                .with(FakeElement::new("user", &["#username"]))
                .with(FakeElement::new("pass", &["#password"]))
                .with(FakeElement::new("signin", &["button[type='submit']"]).navigates_to(FEED)),
        );
        browser.add_page(FEED, Page::new("Welcome back, Jane"));
        browser.add_page(SEARCH, results(&[]));

        let (first, second) = (browser.clone(), browser.clone());
        let human = ScriptedGate::answering(&[true, true])
            .then(move || {
                first.note("solved captcha");
                first.set_text(LOGIN, "Enter the verification code we sent you");
            })
            .then(move || {
                second.note("entered code");
                second.set_text(LOGIN, "Sign in");
            });

        let mut config = quiet_config();
        single_search(&mut config);
        let mut run = automation(&browser, &config, human.clone(), JobAnalyzer::offline(0.3));
        let credentials = Some(("jane@example.com".to_string(), "hunter2".to_string()));

        SiteRunner::new(&mut run, SiteDefinition::builtin(SiteKind::LinkedIn), credentials)
            .run()
            .await
            .unwrap();

        assert_eq!(human.prompts().len(), 2);
        assert!(human.prompts()[1].title.contains("verification code"));
        assert_eq!(
            &browser.actions()[..6],
            &[
                format!("navigate {}", LOGIN),
                "note solved captcha".to_string(),
                "note entered code".to_string(),
                "fill user=jane@example.com".to_string(),
                "fill pass=hunter2".to_string(),
                "click signin".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn declined_login_challenge_ends_the_site() {
        let browser = FakeBrowser::new();
        browser.add_page(LOGIN, Page::new("captcha"));

        let config = quiet_config();
        let mut run = offline_run(&browser, &config, &[false]);

        let err = SiteRunner::new(&mut run, SiteDefinition::builtin(SiteKind::LinkedIn), None)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::LoginFailed(SiteKind::LinkedIn, _)));
        assert_eq!(browser.actions(), vec![format!("navigate {}", LOGIN)]);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_the_login() {
        let browser = FakeBrowser::new();
        browser.add_page(
            LOGIN,
            Page::new("Sign in")
                .with(FakeElement::new("user", &["#username"]))
                .with(FakeElement::new("pass", &["#password"]))
                .with(FakeElement::new("signin", &["button[type='submit']"])),
        );

        let config = quiet_config();
        let mut run = offline_run(&browser, &config, &[]);
        let credentials = Some(("jane@example.com".to_string(), "wrong".to_string()));

        let site = SiteDefinition::builtin(SiteKind::LinkedIn);
        let err = SiteRunner::new(&mut run, site, credentials)
            .run()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("credentials rejected"));
    }

    #[tokio::test]
    async fn email_first_login_clicks_continue() {
        let auth = "https://secure.indeed.com/auth";
        let browser = FakeBrowser::new();
        browser.add_page(
            auth,
            Page::new("Sign in")
                .with(FakeElement::new("user", &["input[type='email']"]))
                .with(
                    FakeElement::new("next", &["button[type='submit']"])
                        .navigates_to(&format!("{}/password", auth)),
                ),
        );
        browser.add_page(
            &format!("{}/password", auth),
            Page::new("Enter your password")
                .with(FakeElement::new("pass", &["input[type='password']"]))
                .with(
                    FakeElement::new("signin", &["button[type='submit']"])
                        .navigates_to("https://www.indeed.com/"),
                ),
        );
        browser.add_page("https://www.indeed.com/", Page::new("Find jobs"));

        let mut config = quiet_config();
        single_search(&mut config);
        let mut run = offline_run(&browser, &config, &[]);
        let credentials = Some(("jane@example.com".to_string(), "hunter2".to_string()));
        let site = SiteDefinition::builtin(SiteKind::Indeed);
        SiteRunner::new(&mut run, site, credentials).run().await.unwrap();

        let actions = browser.actions();
        assert_eq!(actions[1], "fill user=jane@example.com");
        assert_eq!(actions[2], "click next");
        assert_eq!(actions[3], "fill pass=hunter2");
        assert_eq!(actions[4], "click signin");
    }

    #[tokio::test]
    async fn missing_credentials_ask_for_a_manual_login() {
        let browser = FakeBrowser::new();
        browser.add_page(
            LOGIN,
            Page::new("Sign in").with(FakeElement::new("user", &["#username"])),
        );

        let config = quiet_config();
        let human = ScriptedGate::answering(&[false]);
        let mut run = automation(&browser, &config, human.clone(), JobAnalyzer::offline(0.3));

        let err = SiteRunner::new(&mut run, SiteDefinition::builtin(SiteKind::LinkedIn), None)
            .run()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("operator did not sign in"));
        assert_eq!(human.prompts()[0].title, "Sign in to linkedin");
        assert_eq!(browser.count("fill"), 0);
    }

    #[tokio::test]
    async fn blocked_listing_ends_the_site() {
        let browser = FakeBrowser::new();
        browser.add_page(SEARCH, results(&[(1, "Rust Engineer"), (2, "Rust Developer")]));
        browser.add_page(&job_url(1), Page::new("We noticed unusual activity from your account"));
        browser.add_page(&job_url(2), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        let mut run = offline_run(&browser, &config, &[false]);

        let err = SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap_err();

        assert!(matches!(err, SiteError::Blocked(SiteKind::LinkedIn, _)));
        assert_eq!(applied(&run), vec![Outcome::Blocked]);
        assert_eq!(browser.count(&format!("navigate {}", job_url(2))), 0);
    }

    #[tokio::test]
    async fn offline_analyzer_still_drives_the_run() {
        let browser = FakeBrowser::new();
        browser.add_page(SEARCH, results(&[(1, "Rust Engineer")]));
        browser.add_page(&job_url(1), easy_apply_posting());

        let mut config = quiet_config();
        single_search(&mut config);
        config.analyzer.enabled = true;
        let backend = ScriptedBackend::unreachable();
        let analyzer =
            JobAnalyzer::new(Some(Box::new(backend.clone())), config.analyzer.threshold).await;
        assert!(!analyzer.is_online());
        let mut run = automation(&browser, &config, ScriptedGate::answering(&[]), analyzer);

        // one of five skills matches the title: 0.2 is under the 0.3 threshold
        SiteRunner::new(&mut run, linkedin(), None).run().await.unwrap();

        let report = run.recorder.finish(false);
        let result = &report.sites[0].results[0];
        let expected = heuristic::score(&result.job, &config.profile, 0.3);
        assert_eq!(result.outcome, Outcome::Skipped);
        assert_eq!(result.ai_confidence, Some(expected.compatibility_score));
        assert!(!expected.should_apply);
        assert!(backend.prompts().is_empty());
    }

    #[tokio::test]
    async fn sites_run_in_priority_order_and_failures_do_not_stop_the_rest() {
        let browser = FakeBrowser::new();
        browser.add_page("https://secure.indeed.com/auth", Page::new("captcha"));
        browser.add_page("https://www.linkedin.com/", Page::new("Welcome"));
        browser.add_page(SEARCH, results(&[]));

        let mut config = quiet_config();
        single_search(&mut config);
        for site in &mut config.sites {
            site.enabled = site.name != SiteKind::Glassdoor;
            site.priority = if site.name == SiteKind::Indeed { 0 } else { 5 };
        }
        let mut run = offline_run(&browser, &config, &[false]);

        run_sites(&mut run, &[]).await;

        let report = run.recorder.finish(false);
        let order: Vec<SiteKind> = report.sites.iter().map(|s| s.site).collect();
        assert_eq!(order, vec![SiteKind::Indeed, SiteKind::LinkedIn]);
        assert_eq!(report.sites[0].errors.len(), 1);
        assert!(report.sites[1].errors.is_empty());
        assert!(browser.count("navigate https://www.linkedin.com/jobs/search/") >= 1);
    }

    #[tokio::test]
    async fn site_filter_limits_the_run() {
        let browser = FakeBrowser::new();
        browser.add_page("https://", Page::new("Welcome"));

        let mut config = quiet_config();
        single_search(&mut config);
        for site in &mut config.sites {
            site.enabled = true;
        }
        let mut run = offline_run(&browser, &config, &[]);

        run_sites(&mut run, &[SiteKind::Glassdoor]).await;

        let report = run.recorder.finish(false);
        assert_eq!(report.sites.len(), 1);
        assert_eq!(report.sites[0].site, SiteKind::Glassdoor);
    }

    #[tokio::test]
    async fn interrupt_still_closes_the_session_and_writes_results() {
        let browser = FakeBrowser::new();
        browser.add_page("https://", Page::new("Welcome"));
        let dir = tempfile::tempdir().unwrap();

        let mut config = quiet_config();
        config.output.dir = dir.path().to_path_buf();
        let mut run = offline_run(&browser, &config, &[]);

        let report = run_until(&mut run, &[], std::future::ready(())).await;

        assert!(report.interrupted);
        assert!(report.finished_at.is_some());
        assert_eq!(browser.count("navigate"), 0);
        assert_eq!(browser.actions().last().map(String::as_str), Some("close"));

        let written = dir.path().join(report.file_name());
        let raw = std::fs::read_to_string(written).unwrap();
        let parsed: RunReport = serde_json::from_str(&raw).unwrap();
        assert!(parsed.interrupted);
    }

    #[tokio::test]
    async fn finished_run_is_not_marked_interrupted() {
        let browser = FakeBrowser::new();
        browser.add_page("https://", Page::new("Welcome"));
        let dir = tempfile::tempdir().unwrap();

        let mut config = quiet_config();
        config.output.dir = dir.path().to_path_buf();
        single_search(&mut config);
        let mut run = offline_run(&browser, &config, &[]);

        let report = run_until(&mut run, &[], std::future::pending()).await;

        assert!(!report.interrupted);
        assert_eq!(browser.count("close"), 1);
        assert!(dir.path().join(report.file_name()).exists());
    }
}
