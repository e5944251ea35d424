use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use rand::Rng;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use url::Url;

use crate::ledger::{self, Ledger};
use crate::models::{JobListing, NOT_AVAILABLE, SearchResult, VisitedRecord};

/// Raw hits requested per query; fresh results are filtered out of these.
const RAW_RESULTS_PER_QUERY: usize = 20;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

// --- Provider trait ---

pub trait SearchProvider {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchProviderKind {
    DuckDuckGo,
    SearxNG { base_url: String },
}

pub fn resolve_search_provider(name: &str, searxng_url: &str) -> Result<SearchProviderKind> {
    match name.trim().to_lowercase().as_str() {
        "duckduckgo" | "ddg" => Ok(SearchProviderKind::DuckDuckGo),
        "searxng" | "searx" => Ok(SearchProviderKind::SearxNG {
            base_url: searxng_url.trim_end_matches('/').to_string(),
        }),
        other => Err(anyhow!(
            "Unknown search provider '{}'. Available: duckduckgo (default), searxng",
            other
        )),
    }
}

pub fn create_search_provider(kind: &SearchProviderKind) -> Result<Box<dyn SearchProvider>> {
    match kind {
        SearchProviderKind::DuckDuckGo => Ok(Box::new(DuckDuckGoProvider::new()?)),
        SearchProviderKind::SearxNG { base_url } => {
            Ok(Box::new(SearxNGProvider::new(base_url.clone())?))
        }
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(20))
        .build()
        .context("Failed to build search HTTP client")
}

// --- DuckDuckGo (HTML endpoint) ---

const DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com";

pub struct DuckDuckGoProvider {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl DuckDuckGoProvider {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DUCKDUCKGO_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

impl SearchProvider for DuckDuckGoProvider {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(format!("{}/html/", self.base_url))
            .query(&[("q", query)])
            .send()
            .context("Failed to send request to DuckDuckGo")?;

        if !response.status().is_success() {
            return Err(anyhow!("DuckDuckGo returned status {}", response.status()));
        }

        let html = response.text().context("Failed to read DuckDuckGo response")?;
        let mut results = parse_duckduckgo_html(&html);
        results.truncate(limit);
        Ok(results)
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

fn parse_duckduckgo_html(html: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse("div.result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for element in document.select(&result_sel) {
        if element.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(link) = element.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(decode_result_link) else {
            continue;
        };
        let title = collapse_whitespace(&link.text().collect::<String>());
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();

        results.push(SearchResult { url, title, snippet });
    }
    results
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`.
fn decode_result_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;

    if parsed.path() == "/l/" {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// --- SearxNG (JSON API) ---

#[derive(Debug, Deserialize)]
struct SearxResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

pub struct SearxNGProvider {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl SearxNGProvider {
    pub fn new(base_url: String) -> Result<Self> {
        Ok(Self {
            base_url,
            client: http_client()?,
        })
    }
}

impl SearchProvider for SearxNGProvider {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .send()
            .context("Failed to send request to SearxNG")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("SearxNG request failed with status {}: {}", status, error_text));
        }

        let body: SearxResponse = response
            .json()
            .context("Failed to parse SearxNG response")?;

        Ok(body
            .results
            .into_iter()
            .take(limit)
            .map(|r| SearchResult {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "searxng"
    }
}

// --- Accumulation loop ---

/// What to do with the rest of a query's fresh results once the quota is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop at the quota, leaving the remaining fresh results unseen.
    Immediate,
    /// Keep every fresh result of the query that reached the quota.
    FinishQuery,
}

pub struct Accumulator<'a> {
    provider: &'a dyn SearchProvider,
    ledger: &'a Ledger,
    stop_policy: StopPolicy,
    max_delay: Duration,
}

impl<'a> Accumulator<'a> {
    pub fn new(provider: &'a dyn SearchProvider, ledger: &'a Ledger) -> Self {
        Self {
            provider,
            ledger,
            stop_policy: StopPolicy::Immediate,
            max_delay: Duration::ZERO,
        }
    }

    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    /// Upper bound of the random pause taken between two queries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Run `queries` in order until `min_results` fresh listings are collected.
    ///
    /// Every returned url is unique and was absent from the ledger before the call;
    /// each query's newly seen urls are appended to the ledger before the next query runs.
    pub fn accumulate(
        &self,
        queries: &[String],
        min_results: usize,
        max_per_query: usize,
    ) -> Vec<JobListing> {
        let mut seen: HashSet<String> = self.ledger.load();
        let mut jobs: Vec<JobListing> = Vec::new();
        let mut searched = 0;

        for raw_query in queries {
            if jobs.len() >= min_results {
                break;
            }
            let Some(query) = normalize_query(raw_query) else {
                warn!("Skipping empty search query");
                continue;
            };

            if searched > 0 {
                self.pause();
            }
            searched += 1;

            info!("Searching: {}", query);
            let results = match self
                .provider
                .search(&query, RAW_RESULTS_PER_QUERY.max(max_per_query))
            {
                Ok(results) => results,
                Err(e) => {
                    warn!("Search failed for '{}': {:#}", query, e);
                    continue;
                }
            };
            if results.is_empty() {
                info!("Provider returned 0 results for '{}'", query);
                continue;
            }

            let date = ledger::today();
            let mut fresh: Vec<VisitedRecord> = Vec::new();
            for result in &results {
                if fresh.len() >= max_per_query {
                    break;
                }
                if self.stop_policy == StopPolicy::Immediate && jobs.len() >= min_results {
                    break;
                }
                let url = result.url.trim();
                if url.is_empty() || seen.contains(url) {
                    continue;
                }
                seen.insert(url.to_string());
                jobs.push(listing_from_result(result));
                fresh.push(VisitedRecord {
                    url: url.to_string(),
                    date: date.clone(),
                });
            }

            if fresh.is_empty() {
                info!(
                    "All {} results for '{}' were already visited",
                    results.len(),
                    query
                );
                continue;
            }

            if let Err(e) = self.ledger.append(&fresh) {
                warn!("Failed to record visited urls: {:#}", e);
            }
            info!(
                "Got {} new results, total jobs so far: {}",
                fresh.len(),
                jobs.len()
            );
        }

        if jobs.len() < min_results {
            warn!(
                "Queries exhausted with {} of {} requested jobs",
                jobs.len(),
                min_results
            );
        }
        jobs
    }

    fn pause(&self) {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(max_ms / 2..=max_ms);
        debug!("Pausing {}ms before next query", ms);
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Strip quotes and whitespace; make sure the query asks for jobs.
pub fn normalize_query(query: &str) -> Option<String> {
    let cleaned = query.replace('"', "");
    let cleaned = cleaned.trim().trim_matches('\'').trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.to_lowercase().contains("job") {
        Some(cleaned.to_string())
    } else {
        Some(format!("{} jobs", cleaned))
    }
}

/// "Backend Engineer at Spotify" splits into title and company.
fn listing_from_result(result: &SearchResult) -> JobListing {
    let title = result.title.trim();
    let title = if title.is_empty() { "Job Post" } else { title };

    match title.split_once(" at ") {
        Some((title, company)) => JobListing::new(title.trim(), company.trim(), result.url.trim()),
        None => JobListing::new(title, NOT_AVAILABLE, result.url.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned results per normalized query and records every call.
    struct StubProvider {
        responses: HashMap<String, Result<Vec<SearchResult>, String>>,
        calls: RefCell<Vec<String>>,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn with(mut self, query: &str, urls: &[(&str, &str)]) -> Self {
            let results: Vec<SearchResult> = urls
                .iter()
                .map(|(url, title)| SearchResult {
                    url: url.to_string(),
                    title: title.to_string(),
                    snippet: String::new(),
                })
                .collect();
            self.responses.insert(query.to_string(), Ok(results));
            self
        }

        fn failing(mut self, query: &str) -> Self {
            self.responses
                .insert(query.to_string(), Err("rate limited".to_string()));
            self
        }
    }

    impl SearchProvider for StubProvider {
        fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
            self.calls.borrow_mut().push(query.to_string());
            match self.responses.get(query) {
                Some(Ok(results)) => Ok(results.iter().take(limit).cloned().collect()),
                Some(Err(e)) => Err(anyhow!(e.clone())),
                None => Ok(Vec::new()),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn queries(qs: &[&str]) -> Vec<String> {
        qs.iter().map(|q| q.to_string()).collect()
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(
            normalize_query("  \"Software Engineer Stockholm\" ").as_deref(),
            Some("Software Engineer Stockholm jobs")
        );
        assert_eq!(normalize_query("Rust JOBS Berlin").as_deref(), Some("Rust JOBS Berlin"));
        assert_eq!(normalize_query("Remote job board").as_deref(), Some("Remote job board"));
        assert_eq!(normalize_query(" \"\" "), None);
    }

    #[test]
    fn test_listing_from_result_splits_company() {
        let result = SearchResult {
            url: "https://x.example/1".to_string(),
            title: "Backend Engineer at Spotify at Stockholm".to_string(),
            snippet: String::new(),
        };
        let listing = listing_from_result(&result);
        assert_eq!(listing.title, "Backend Engineer");
        assert_eq!(listing.company, "Spotify at Stockholm");

        let result = SearchResult {
            url: "https://x.example/2".to_string(),
            title: "Data Engineer - Klarna".to_string(),
            snippet: String::new(),
        };
        assert_eq!(listing_from_result(&result).company, "N/A");
    }

    #[test]
    fn test_skips_ledger_urls() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        ledger
            .append(&[VisitedRecord {
                url: "https://jobs.example/old".to_string(),
                date: "2026-01-01".to_string(),
            }])
            .unwrap();

        let provider = StubProvider::new().with(
            "Software Engineer Stockholm jobs",
            &[
                ("https://jobs.example/old", "Old Posting at Acme"),
                ("https://jobs.example/new", "Software Engineer at Spotify"),
            ],
        );

        let jobs = Accumulator::new(&provider, &ledger).accumulate(
            &queries(&["Software Engineer Stockholm"]),
            1,
            15,
        );

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, "https://jobs.example/new");
        assert_eq!(jobs[0].company, "Spotify");
        assert!(ledger.load().contains("https://jobs.example/new"));
    }

    #[test]
    fn test_second_run_is_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        let provider = StubProvider::new().with(
            "Rust jobs",
            &[
                ("https://a.example/1", "Rust Dev"),
                ("https://a.example/2", "Rust Dev II"),
                ("https://a.example/3", "Rust Dev III"),
            ],
        );
        let accumulator = Accumulator::new(&provider, &ledger);

        let first = accumulator.accumulate(&queries(&["Rust"]), 2, 15);
        let second = accumulator.accumulate(&queries(&["Rust"]), 2, 15);

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        let first_urls: HashSet<_> = first.iter().map(|j| j.url.clone()).collect();
        assert!(second.iter().all(|j| !first_urls.contains(&j.url)));
    }

    #[test]
    fn test_stops_once_quota_reached() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        let provider = StubProvider::new()
            .with("a jobs", &[("https://a.example/1", "A"), ("https://a.example/2", "B")])
            .with("b jobs", &[("https://b.example/1", "C")]);

        let jobs = Accumulator::new(&provider, &ledger).accumulate(&queries(&["a", "b"]), 2, 15);

        assert_eq!(jobs.len(), 2);
        assert_eq!(*provider.calls.borrow(), vec!["a jobs".to_string()]);
    }

    #[test]
    fn test_failed_query_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        let provider = StubProvider::new()
            .failing("a jobs")
            .with("b jobs", &[("https://b.example/1", "C"), ("https://b.example/1", "C dup")]);

        let jobs = Accumulator::new(&provider, &ledger).accumulate(&queries(&["a", "b"]), 5, 15);

        assert_eq!(jobs.len(), 1);
        assert_eq!(provider.calls.borrow().len(), 2);
    }

    #[test]
    fn test_immediate_stop_leaves_remaining_results_unrecorded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        let provider = StubProvider::new().with(
            "a jobs",
            &[("https://a.example/1", "A"), ("https://a.example/2", "B"), ("https://a.example/3", "C")],
        );

        let jobs = Accumulator::new(&provider, &ledger).accumulate(&queries(&["a"]), 1, 15);
        assert_eq!(jobs.len(), 1);
        assert_eq!(ledger.load().len(), 1);

        let jobs = Accumulator::new(&provider, &ledger)
            .stop_policy(StopPolicy::FinishQuery)
            .accumulate(&queries(&["a"]), 1, 15);
        assert_eq!(jobs.len(), 2);
        assert_eq!(ledger.load().len(), 3);
    }

    #[test]
    fn test_max_per_query_caps_fresh_results() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::new(dir.path().join("visited.csv"));
        let provider = StubProvider::new().with(
            "a jobs",
            &[("https://a.example/1", "A"), ("https://a.example/2", "B"), ("https://a.example/3", "C")],
        );

        let jobs = Accumulator::new(&provider, &ledger).accumulate(&queries(&["a"]), 10, 2);
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn test_parse_duckduckgo_html() {
        let html = r#"
            <div class="result results_links result--ad">
              <a class="result__a" href="https://ads.example/">Ad</a>
            </div>
            <div class="result results_links">
              <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fcareers.example.com%2Fjobs%2F7&amp;rut=abc">
                Rust Engineer at Example</a></h2>
              <a class="result__snippet">Build   systems in Rust.</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://direct.example/job">Direct</a>
            </div>
        "#;
        let results = parse_duckduckgo_html(html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://careers.example.com/jobs/7");
        assert_eq!(results[0].title, "Rust Engineer at Example");
        assert_eq!(results[0].snippet, "Build systems in Rust.");
        assert_eq!(results[1].url, "https://direct.example/job");
    }

    #[test]
    fn test_searxng_provider() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("q".into(), "Rust jobs".into()),
                mockito::Matcher::UrlEncoded("format".into(), "json".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results":[{"url":"https://a.example/1","title":"Rust Dev at A","content":"x"},{"url":"https://a.example/2"}]}"#,
            )
            .create();

        let provider = SearxNGProvider::new(server.url()).unwrap();
        let results = provider.search("Rust jobs", 1).unwrap();

        mock.assert();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rust Dev at A");
        assert_eq!(results[0].snippet, "x");
    }

    #[test]
    fn test_duckduckgo_provider_error_status() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/html/")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create();

        let provider = DuckDuckGoProvider::with_base_url(&server.url()).unwrap();
        assert!(provider.search("Rust jobs", 5).is_err());
    }

    #[test]
    fn test_resolve_search_provider() {
        assert_eq!(
            resolve_search_provider("DuckDuckGo", "").unwrap(),
            SearchProviderKind::DuckDuckGo
        );
        assert_eq!(
            resolve_search_provider("searxng", "http://localhost:8080/").unwrap(),
            SearchProviderKind::SearxNG {
                base_url: "http://localhost:8080".to_string()
            }
        );
        assert!(resolve_search_provider("bing", "").is_err());
    }
}
