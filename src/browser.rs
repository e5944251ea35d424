use anyhow::{Context, Result};
use log::{debug, info};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;
use thirtyfour::ChromiumLikeCapabilities;
use thirtyfour::prelude::*;

use crate::error::FetchError;

/// Description text handed to the model is capped at this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

// Common job-board containers, most specific first.
const DESCRIPTION_SELECTORS: &[&str] = &[
    ".jobs-description__content",
    ".show-more-less-html__markup",
    "#job-details",
    "[class*='job-description']",
    "[class*='jobDescription']",
    "article",
    "main",
];

// A container shorter than this is probably a teaser; use the whole page.
const MIN_CONTAINER_CHARS: usize = 200;

pub trait PageFetcher {
    /// Visible text of the page at `url`, at most `MAX_DESCRIPTION_CHARS` long.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherKind {
    Http,
    WebDriver { url: String },
}

pub fn resolve_fetcher(name: &str, webdriver_url: &str) -> Result<FetcherKind> {
    match name.trim().to_lowercase().as_str() {
        "http" | "reqwest" => Ok(FetcherKind::Http),
        "webdriver" | "chrome" | "browser" => Ok(FetcherKind::WebDriver {
            url: webdriver_url.to_string(),
        }),
        other => Err(anyhow::anyhow!(
            "Unknown scraper '{}'. Available: http (default), webdriver",
            other
        )),
    }
}

pub fn create_fetcher(kind: &FetcherKind) -> Result<Box<dyn PageFetcher>> {
    match kind {
        FetcherKind::Http => Ok(Box::new(HttpFetcher::new()?)),
        FetcherKind::WebDriver { url } => Ok(Box::new(WebDriverFetcher::new(url.clone())?)),
    }
}

// --- Plain HTTP ---

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build page HTTP client")?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching {}", url);
        let html = self.client.get(url).send()?.error_for_status()?.text()?;
        extract_description(&html)
    }
}

// --- Headless Chrome over WebDriver ---

/// Drives a chromedriver session per page. Needed for pages that render client side.
pub struct WebDriverFetcher {
    webdriver_url: String,
    runtime: tokio::runtime::Runtime,
}

impl WebDriverFetcher {
    pub fn new(webdriver_url: String) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start runtime for WebDriver")?;
        Ok(Self {
            webdriver_url,
            runtime,
        })
    }

    async fn page_source(&self, url: &str) -> Result<String, FetchError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.set_headless()?;
        caps.add_arg(&format!("--user-agent={}", USER_AGENT))?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;

        let driver = WebDriver::new(&self.webdriver_url, caps).await?;
        let source = async {
            driver.set_page_load_timeout(Duration::from_secs(30)).await?;
            driver.goto(url).await?;
            // Let client-side rendering settle.
            tokio::time::sleep(Duration::from_secs(2)).await;
            driver.source().await
        }
        .await;

        driver.quit().await?;
        Ok(source?)
    }
}

impl PageFetcher for WebDriverFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        info!("Launching headless browser for {}", url);
        let html = self.runtime.block_on(self.page_source(url))?;
        extract_description(&html)
    }
}

// --- HTML to text ---

/// Pick the job description container if one is recognisable, else the whole page.
pub fn extract_description(html: &str) -> Result<String, FetchError> {
    let document = Html::parse_document(html);

    for selector in DESCRIPTION_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&sel).next() {
            let text = visible_text(element);
            if text.chars().count() >= MIN_CONTAINER_CHARS {
                debug!("Description found with selector {}", selector);
                return Ok(truncate_chars(&text, MAX_DESCRIPTION_CHARS));
            }
        }
    }

    let text = visible_text(document.root_element());
    if text.is_empty() {
        return Err(FetchError::EmptyPage);
    }
    Ok(truncate_chars(&text, MAX_DESCRIPTION_CHARS))
}

fn visible_text(root: ElementRef) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_description_drops_scripts() {
        let html = r#"<html><head><style>body { color: red }</style></head>
            <body><h1>Rust   Engineer</h1><script>var tracking = 1;</script>
            <p>Work on <b>systems</b>.</p><noscript>Enable JS</noscript></body></html>"#;
        let text = extract_description(html).unwrap();
        assert_eq!(text, "Rust Engineer Work on systems .");
    }

    #[test]
    fn test_extract_description_prefers_container() {
        let body = "Responsibilities include building services. ".repeat(10);
        let html = format!(
            "<html><body><nav>Home Jobs About</nav><div class=\"job-description-body\">{}</div><footer>Cookie policy</footer></body></html>",
            body
        );
        let text = extract_description(&html).unwrap();
        assert!(text.starts_with("Responsibilities include"));
        assert!(!text.contains("Cookie policy"));
    }

    #[test]
    fn test_extract_description_empty_page() {
        let result = extract_description("<html><body><script>x()</script></body></html>");
        assert!(matches!(result, Err(FetchError::EmptyPage)));
    }

    #[test]
    fn test_extract_description_is_capped() {
        let html = format!("<html><body><p>{}</p></body></html>", "å".repeat(6000));
        let text = extract_description(&html).unwrap();
        assert_eq!(text.chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn test_content_starting_with_error_is_content() {
        let html = "<html><body><p>Error budgets are owned by this team.</p></body></html>";
        let text = extract_description(html).unwrap();
        assert!(text.starts_with("Error budgets"));
    }

    #[test]
    fn test_http_fetcher_reports_status() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/gone").with_status(404).create();
        server
            .mock("GET", "/job")
            .with_status(200)
            .with_body("<html><body><p>Senior Rust Engineer</p></body></html>")
            .create();

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&format!("{}/gone", server.url())).unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404 }));

        let text = fetcher.fetch(&format!("{}/job", server.url())).unwrap();
        assert_eq!(text, "Senior Rust Engineer");
    }

    #[test]
    fn test_resolve_fetcher() {
        assert_eq!(resolve_fetcher("http", "").unwrap(), FetcherKind::Http);
        assert!(matches!(
            resolve_fetcher("WebDriver", "http://localhost:9515").unwrap(),
            FetcherKind::WebDriver { .. }
        ));
        assert!(resolve_fetcher("lynx", "").is_err());
    }

    #[test]
    #[ignore] // Requires a running chromedriver
    fn test_webdriver_fetch() {
        let fetcher = WebDriverFetcher::new("http://localhost:9515".to_string()).unwrap();
        let text = fetcher.fetch("https://example.com").unwrap();
        assert!(text.contains("Example Domain"));
    }
}
