use anyhow::{Context, Result, anyhow};
use log::warn;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::ai::{self, ModelSpec};
use crate::browser::{self, FetcherKind};
use crate::search::{self, SearchProviderKind, StopPolicy};

/// Where the job list handed to the pipeline comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Search results are the job list.
    Search,
    /// Search results are shortlisted by the model, whose reply is parsed back into listings.
    Model,
}

/// Everything read from the environment, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub min_jobs: usize,
    pub max_per_query: usize,
    pub score_threshold: u8,
    pub model: ModelSpec,
    pub search_provider: SearchProviderKind,
    pub fetcher: FetcherKind,
    pub ledger_path: PathBuf,
    pub discovery_mode: DiscoveryMode,
    pub stop_policy: StopPolicy,
    pub search_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let min_jobs = parse_var(&get, "MAX_JOBS", 10usize)?;
        let max_per_query = parse_var(&get, "MAX_PER_QUERY", 15usize)?;
        let score_threshold = parse_var(&get, "SCORE_THRESHOLD", 70u32)?.min(100) as u8;
        let search_delay = Duration::from_millis(parse_var(&get, "SEARCH_DELAY_MS", 1500u64)?);

        let provider = get("LLM_PROVIDER").unwrap_or_else(|| "ollama".to_string());
        let mut model = ai::resolve_model(&provider, get("MODEL_NAME").as_deref());
        model.api_key = match model.provider {
            ai::ProviderKind::OpenAI => get("OPENAI_API_KEY"),
            ai::ProviderKind::Gemini => get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            ai::ProviderKind::Anthropic => get("ANTHROPIC_API_KEY"),
            ai::ProviderKind::Ollama => None,
        };
        if model.provider == ai::ProviderKind::Ollama {
            if let Some(base_url) = get("OLLAMA_BASE_URL") {
                model.base_url = base_url;
            }
        }

        let search_provider = search::resolve_search_provider(
            &get("SEARCH_PROVIDER").unwrap_or_else(|| "duckduckgo".to_string()),
            &get("SEARXNG_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
        )?;

        let fetcher = browser::resolve_fetcher(
            &get("SCRAPER").unwrap_or_else(|| "http".to_string()),
            &get("WEBDRIVER_URL").unwrap_or_else(|| "http://localhost:9515".to_string()),
        )?;

        let discovery_mode = match get("DISCOVERY_MODE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("search") => DiscoveryMode::Search,
            Some("model") | Some("agent") => DiscoveryMode::Model,
            Some(other) => return Err(anyhow!("Unknown DISCOVERY_MODE '{}'. Available: search, model", other)),
        };

        let stop_policy = match get("STOP_POLICY").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("immediate") => StopPolicy::Immediate,
            Some("finish-query") | Some("finish_query") => StopPolicy::FinishQuery,
            Some(other) => {
                return Err(anyhow!(
                    "Unknown STOP_POLICY '{}'. Available: immediate, finish-query",
                    other
                ));
            }
        };

        Ok(Self {
            min_jobs,
            max_per_query,
            score_threshold,
            model,
            search_provider,
            fetcher,
            ledger_path: get("VISITED_URLS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("visited_urls.csv")),
            discovery_mode,
            stop_policy,
            search_delay,
        })
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Job preferences from the conditions file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    pub city: String,
    pub job_titles: String,
    pub tech_stack: String,
    pub work_condition: String,
    pub salary: String,
    pub other: String,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            city: "Remote".to_string(),
            job_titles: "Software Engineer".to_string(),
            tech_stack: String::new(),
            work_condition: "Remote".to_string(),
            salary: "N/A".to_string(),
            other: String::new(),
        }
    }
}

impl Conditions {
    /// Read the conditions file; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("{} not found. Using default preferences.", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read conditions file: {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// `key: value` lines; keys match by case-insensitive substring.
    pub fn parse(text: &str) -> Self {
        let mut conditions = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim().to_string();

            if key.contains("city") {
                conditions.city = value;
            } else if key.contains("job title") {
                conditions.job_titles = value;
            } else if key.contains("tech stack") {
                conditions.tech_stack = value;
            } else if key.contains("work condition") {
                conditions.work_condition = value;
            } else if key.contains("salary") {
                conditions.salary = value;
            } else if key.contains("other") {
                conditions.other = value;
            }
        }
        conditions
    }

    pub fn titles(&self) -> Vec<&str> {
        split_list(&self.job_titles)
    }

    /// Discovery queries: every title in the city, then every title with the lead technology.
    pub fn search_queries(&self) -> Vec<String> {
        let city = self.city.trim();
        let lead_tech = split_list(&self.tech_stack).into_iter().next();

        let mut queries: Vec<String> = Vec::new();
        let mut push = |q: String| {
            let q = q.split_whitespace().collect::<Vec<_>>().join(" ");
            if !q.is_empty() && !queries.contains(&q) {
                queries.push(q);
            }
        };

        for title in self.titles() {
            push(format!("{} {}", title, city));
        }
        if let Some(tech) = lead_tech {
            for title in self.titles() {
                push(format!("{} {} {}", title, tech, city));
            }
        }
        queries
    }
}

fn split_list(list: &str) -> Vec<&str> {
    list.split([',', ';', '/'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
