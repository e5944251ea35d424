use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::browser::truncate_chars;
use crate::config::Conditions;
use crate::models::JobListing;

// --- Provider trait ---

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAI,
    Gemini,
    Anthropic,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Map a provider name (and optional model) to a `ModelSpec`. Unknown providers fall back to Ollama.
pub fn resolve_model(provider: &str, model: Option<&str>) -> ModelSpec {
    let (kind, default_model, base_url) = match provider.trim().to_lowercase().as_str() {
        "ollama" => (ProviderKind::Ollama, "llama3", OLLAMA_BASE_URL),
        "openai" => (ProviderKind::OpenAI, "gpt-4o", OPENAI_BASE_URL),
        "gemini" | "google" => (ProviderKind::Gemini, "gemini-1.5-flash", GEMINI_BASE_URL),
        "anthropic" | "claude" => (
            ProviderKind::Anthropic,
            "claude-sonnet-4-5-20250929",
            ANTHROPIC_BASE_URL,
        ),
        other => {
            warn!(
                "Unknown LLM provider '{}', falling back to ollama. Available: ollama, openai, gemini, anthropic",
                other
            );
            (ProviderKind::Ollama, "llama3", OLLAMA_BASE_URL)
        }
    };

    ModelSpec {
        provider: kind,
        model_id: model.unwrap_or(default_model).to_string(),
        base_url: base_url.to_string(),
        api_key: None,
    }
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn AIProvider>> {
    match spec.provider {
        ProviderKind::Ollama => Ok(Box::new(OllamaProvider::new(spec)?)),
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(spec)?)),
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(spec)?)),
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(spec)?)),
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    // Local models can take minutes on a long prompt.
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .context("Failed to build model HTTP client")
}

fn require_key(spec: &ModelSpec, var: &str) -> Result<String> {
    spec.api_key.clone().ok_or_else(|| {
        anyhow!(
            "{} environment variable not set. Set it with: export {}=your-key-here",
            var,
            var
        )
    })
}

fn check_status(response: reqwest::blocking::Response, api: &str) -> Result<reqwest::blocking::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().unwrap_or_default();
    Err(anyhow!(
        "{} request failed with status {}: {}",
        api,
        status,
        error_text
    ))
}

// --- Ollama provider ---

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug)]
pub struct OllamaProvider {
    base_url: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OllamaProvider {
    pub fn new(spec: &ModelSpec) -> Result<Self> {
        Ok(Self {
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model_id: spec.model_id.clone(),
            client: http_client()?,
        })
    }
}

impl AIProvider for OllamaProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model_id,
            prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        let api_response: OllamaResponse = check_status(response, "Ollama")?
            .json()
            .context("Failed to parse Ollama response")?;

        Ok(api_response.response)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(spec: &ModelSpec) -> Result<Self> {
        Ok(Self {
            api_key: require_key(spec, "OPENAI_API_KEY")?,
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model_id: spec.model_id.clone(),
            client: http_client()?,
        })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAIRequest {
            model: &self.model_id,
            max_tokens,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        let api_response: OpenAIResponse = check_status(response, "OpenAI API")?
            .json()
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenAI API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Gemini provider ---

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    base_url: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl GeminiProvider {
    pub fn new(spec: &ModelSpec) -> Result<Self> {
        Ok(Self {
            api_key: require_key(spec, "GEMINI_API_KEY")?,
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model_id: spec.model_id.clone(),
            client: http_client()?,
        })
    }
}

impl AIProvider for GeminiProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model_id
            ))
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .context("Failed to send request to Gemini API")?;

        let api_response: GeminiResponse = check_status(response, "Gemini API")?
            .json()
            .context("Failed to parse Gemini API response")?;

        let text = api_response
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect::<String>())
            .ok_or_else(|| anyhow!("No candidates in Gemini API response"))?;
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Anthropic provider ---

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(spec: &ModelSpec) -> Result<Self> {
        Ok(Self {
            api_key: require_key(spec, "ANTHROPIC_API_KEY")?,
            base_url: spec.base_url.trim_end_matches('/').to_string(),
            model_id: spec.model_id.clone(),
            client: http_client()?,
        })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model_id,
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        let api_response: AnthropicResponse = check_status(response, "Anthropic API")?
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .into_iter()
            .find(|block| block.content_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Prompts ---

const CV_EXCERPT_DISCOVERY: usize = 1000;
const CV_EXCERPT: usize = 1500;
const DESCRIPTION_EXCERPT: usize = 3500;

/// Ask the model to shortlist candidate postings. The reply is free text for `parse_listings`.
pub fn discover_jobs(
    provider: &dyn AIProvider,
    cv: &str,
    conditions: &Conditions,
    candidates: &[JobListing],
) -> Result<String> {
    let mut listing_text = String::new();
    for (i, job) in candidates.iter().enumerate() {
        listing_text.push_str(&format!(
            "{}. Title: {}\n   Company: {}\n   URL: {}\n",
            i + 1,
            job.title,
            job.company,
            job.url
        ));
    }

    let prompt = format!(
        "You are a job researcher. Pick the postings below that fit this candidate.\n\n\
        Candidate CV (excerpt):\n{cv}\n\n\
        Preferences:\n\
        - Job titles: {titles}\n\
        - City: {city}\n\
        - Tech stack: {tech}\n\
        - Work condition: {work}\n\
        - Salary: {salary}\n\
        - Other: {other}\n\n\
        Candidate postings:\n{listing_text}\n\
        Prefer direct company career pages over generic job boards. \
        Return a numbered list. For each posting give exactly these lines:\n\
        Title: <job title>\n\
        Company: <company>\n\
        URL: <url copied unchanged from above>",
        cv = truncate_chars(cv, CV_EXCERPT_DISCOVERY),
        titles = conditions.job_titles,
        city = conditions.city,
        tech = conditions.tech_stack,
        work = conditions.work_condition,
        salary = conditions.salary,
        other = conditions.other,
    );
    debug!("Discovery prompt is {} characters", prompt.len());
    provider.complete(&prompt, 4096)
}

/// Score one posting against the CV. Expected reply: `Score: N | Category: X | Tech Stack: Y`.
pub fn analyze_job(
    provider: &dyn AIProvider,
    job: &JobListing,
    description: &str,
    cv: &str,
) -> Result<String> {
    let prompt = format!(
        "Job: {} at {}\nURL: {}\n\nJob description:\n{}\n\n\
        Candidate CV (excerpt):\n{}\n\n\
        Score this job fit from 0 to 100. Extract Job Category and Tech Stack. \
        Reply with exactly one line in this format: \
        Score: <number> | Category: <text> | Tech Stack: <comma-separated>",
        job.title,
        job.company,
        job.url,
        truncate_chars(description, DESCRIPTION_EXCERPT),
        truncate_chars(cv, CV_EXCERPT),
    );
    provider.complete(&prompt, 256)
}

pub fn write_cover_letter(
    provider: &dyn AIProvider,
    job: &JobListing,
    description: &str,
    cv: &str,
) -> Result<String> {
    let prompt = format!(
        "Job: {} at {}\n\nJob description:\n{}\n\n\
        Candidate CV (excerpt):\n{}\n\n\
        Write a professional, tailored cover letter for this job (3-5 short paragraphs). \
        Output only the cover letter text, no labels.",
        job.title,
        job.company,
        truncate_chars(description, DESCRIPTION_EXCERPT),
        truncate_chars(cv, CV_EXCERPT),
    );
    provider.complete(&prompt, 2048)
}
