use async_trait::async_trait;
use eyre::{Result, eyre};
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use log::{debug, info};
use serde_json::{Map, Value, json};

use crate::browser::{Browser, FieldDescriptor, Selector};
use crate::utils::config::{BrowserConfig, BrowserEngine};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const LABEL_SCRIPT: &str = r#"
const el = arguments[0];
if (el.labels && el.labels.length) return el.labels[0].innerText;
const id = el.getAttribute('id');
if (id) {
    const l = document.querySelector('label[for="' + CSS.escape(id) + '"]');
    if (l) return l.innerText;
}
const wrap = el.closest('label');
if (wrap) return wrap.innerText;
const parent = el.parentElement;
if (parent) {
    const l = parent.querySelector('label');
    if (l) return l.innerText;
}
return '';
"#;

const SELECT_SCRIPT: &str = r#"
const sel = arguments[0];
const wanted = arguments[1].map(w => w.toLowerCase());
for (const w of wanted) {
    for (const o of sel.options) {
        const t = (o.text || '').trim();
        if (t && !o.disabled && t.toLowerCase().includes(w)) {
            sel.value = o.value;
            sel.dispatchEvent(new Event('change', { bubbles: true }));
            return t;
        }
    }
}
return null;
"#;

const CLICK_AT_SCRIPT: &str = r#"
const ratio = window.devicePixelRatio || 1;
const el = document.elementFromPoint(arguments[0] / ratio, arguments[1] / ratio);
if (!el) return false;
el.click();
return true;
"#;

/// The one browser session of a run, driven over WebDriver.
pub struct SessionDriver {
    client: Client,
}

impl SessionDriver {
    /// Opens a new WebDriver session. Failing here aborts the run.
    pub async fn start(config: &BrowserConfig) -> Result<Self> {
        info!(
            "starting {:?} session via {}",
            config.engine, config.webdriver_url
        );

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities(config));
        let client = builder.connect(&config.webdriver_url).await.map_err(|e| {
            eyre!(
                "could not start a browser session at {} (is chromedriver/geckodriver running?): {}",
                config.webdriver_url,
                e
            )
        })?;

        let [width, height] = config.window;
        if let Err(e) = client.set_window_size(width, height).await {
            debug!("could not resize window: {}", e);
        }

        Ok(Self { client })
    }

    async fn script_click(&self, element: &Element) -> Result<()> {
        self.client
            .execute("arguments[0].click();", vec![serde_json::to_value(element)?])
            .await?;
        Ok(())
    }
}

fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
    let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let mut caps = Map::new();

    match config.engine {
        BrowserEngine::Chrome => {
            let mut args = vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
                format!("--user-agent={}", user_agent),
            ];
            if config.headless {
                args.push("--headless=new".to_string());
            }
            if let Some(dir) = &config.user_data_dir {
                args.push(format!("--user-data-dir={}", dir.display()));
            }
            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert(
                "goog:chromeOptions".to_string(),
                json!({
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                }),
            );
        }
        BrowserEngine::Firefox => {
            let mut args = Vec::new();
            if config.headless {
                args.push("-headless".to_string());
            }
            if let Some(dir) = &config.user_data_dir {
                args.push("-profile".to_string());
                args.push(dir.display().to_string());
            }
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({
                    "args": args,
                    "prefs": { "general.useragent.override": user_agent },
                }),
            );
        }
    }

    caps
}

fn locator<'a>(selector: Selector<'a>) -> Locator<'a> {
    match selector {
        Selector::Css(s) => Locator::Css(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

#[async_trait]
impl Browser for SessionDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn page_text(&self) -> Result<String> {
        let text = self
            .client
            .execute(
                "return document.body ? document.body.innerText : '';",
                vec![],
            )
            .await?;
        Ok(text.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn find_all(&self, selector: Selector<'_>) -> Result<Vec<Element>> {
        Ok(self.client.find_all(locator(selector)).await?)
    }

    async fn find_within(&self, parent: &Element, selector: Selector<'_>) -> Result<Vec<Element>> {
        Ok(parent.find_all(locator(selector)).await?)
    }

    async fn is_interactable(&self, element: &Element) -> Result<bool> {
        Ok(element.is_displayed().await? && element.is_enabled().await?)
    }

    async fn text(&self, element: &Element) -> Result<String> {
        Ok(element.text().await?.trim().to_string())
    }

    async fn attr(&self, element: &Element, name: &str) -> Result<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn link(&self, element: &Element) -> Result<Option<String>> {
        if let Some(href) = element.prop("href").await? {
            return Ok(Some(href));
        }
        match element.find_all(Locator::Css("a[href]")).await?.first() {
            Some(anchor) => Ok(anchor.prop("href").await?),
            None => Ok(None),
        }
    }

    async fn describe_field(&self, element: &Element) -> Result<FieldDescriptor> {
        let label = self
            .client
            .execute(LABEL_SCRIPT, vec![serde_json::to_value(element)?])
            .await?;

        Ok(FieldDescriptor {
            tag: element.tag_name().await?.to_lowercase(),
            input_type: element.attr("type").await?.unwrap_or_default(),
            name: element.attr("name").await?.unwrap_or_default(),
            id: element.attr("id").await?.unwrap_or_default(),
            placeholder: element.attr("placeholder").await?.unwrap_or_default(),
            aria_label: element.attr("aria-label").await?.unwrap_or_default(),
            label: label.as_str().unwrap_or_default().trim().to_string(),
            value: element.prop("value").await?.unwrap_or_default(),
        })
    }

    async fn click(&self, element: &Element) -> Result<()> {
        if let Err(e) = element.click().await {
            // overlays intercepting the native click are common on job boards
            debug!("native click failed ({}), retrying via script", e);
            self.script_click(element).await?;
        }
        Ok(())
    }

    async fn click_at(&self, x: u32, y: u32) -> Result<()> {
        let clicked = self
            .client
            .execute(CLICK_AT_SCRIPT, vec![json!(x), json!(y)])
            .await?;
        if clicked.as_bool() != Some(true) {
            return Err(eyre!("nothing clickable at ({}, {})", x, y));
        }
        Ok(())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<()> {
        element.clear().await?;
        element.send_keys(value).await?;
        Ok(())
    }

    async fn select_option(&self, element: &Element, wanted: &[String]) -> Result<Option<String>> {
        let chosen = self
            .client
            .execute(SELECT_SCRIPT, vec![serde_json::to_value(element)?, json!(wanted)])
            .await?;
        Ok(chosen.as_str().map(str::to_string))
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await?;
        info!("browser session closed");
        Ok(())
    }
}
