//! Best-effort extraction of structured records from free-text model replies.
//!
//! Neither parser fails: malformed input degrades to documented defaults.
//! Listing extraction runs in ordered tiers:
//!
//! 1. labeled fields (`Title:` / `Company:`) inside each enumerated block,
//! 2. first non-URL line of the block as the title,
//! 3. a flat scan emitting one listing per URL when no block produced anything.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AnalysisResult, FALLBACK_TITLE, JobListing, NOT_AVAILABLE, UNKNOWN_TITLE};

// Numbered markers ("1.", "2)") may be indented; bullets only split at column 0 so that
// indented "- Company: ..." lines stay inside their block.
static BLOCK_DELIMITER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^[ \t]*\d+[.)][ \t]+|^[-*•][ \t]+|\bJob[ \t]+\d+:").expect("valid block regex")
});

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s)\]>"'<]+"#).expect("valid url regex"));

static TITLE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)title:[ \t]*([^\r\n]*)").expect("valid title regex"));

static COMPANY_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)company:[ \t]*([^\r\n]*)").expect("valid company regex"));

static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)score:\s*(\d+)").expect("valid score regex"));

static CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)category:[ \t]*([^|\r\n]*)").expect("valid category regex"));

static TECH_STACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tech stack:[ \t]*([^\r\n]*)").expect("valid tech stack regex"));

/// Extract job listings from a discovery reply.
///
/// Returns an empty list only when `raw` contains no URL at all.
pub fn parse_listings(raw: &str) -> Vec<JobListing> {
    let jobs: Vec<JobListing> = BLOCK_DELIMITER
        .split(raw)
        .filter(|block| !block.trim().is_empty())
        .filter_map(parse_block)
        .collect();

    if !jobs.is_empty() {
        return jobs;
    }
    scan_urls(raw)
}

// Last resort: every URL in the text becomes a bare listing. Block splitting never cuts
// through a URL, so with the current delimiter this only matters if `parse_block` gets stricter.
fn scan_urls(raw: &str) -> Vec<JobListing> {
    URL.find_iter(raw)
        .map(|m| clean_url(m.as_str()))
        .filter(|url| !url.is_empty())
        .map(|url| JobListing::new(FALLBACK_TITLE, NOT_AVAILABLE, url))
        .collect()
}

fn parse_block(block: &str) -> Option<JobListing> {
    let url = URL
        .find_iter(block)
        .map(|m| clean_url(m.as_str()))
        .find(|url| !url.is_empty())?;

    let title = labeled_value(&TITLE_LABEL, block)
        .or_else(|| {
            block
                .lines()
                .map(strip_decoration)
                .find(|line| !line.is_empty() && !URL.is_match(line))
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());

    let company = labeled_value(&COMPANY_LABEL, block).unwrap_or_else(|| NOT_AVAILABLE.to_string());

    Some(JobListing::new(title, company, url))
}

fn labeled_value(label: &Regex, block: &str) -> Option<String> {
    label
        .captures(block)
        .map(|caps| strip_decoration(&caps[1]).to_string())
        .filter(|value| !value.is_empty())
}

// Markdown emphasis survives label matching ("**Title:** Foo" captures "** Foo").
fn strip_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '_' || c == '#')
}

fn clean_url(url: &str) -> String {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', '*'])
        .to_string()
}

/// Extract the `Score | Category | Tech Stack` triple from an analysis reply.
///
/// Fields are independent; each one missing falls back to its default.
/// A negative score ("Score: -5") does not match the digit pattern and yields 0.
pub fn parse_analysis(raw: &str) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    if let Some(caps) = SCORE.captures(raw) {
        // Overflowing digit runs are far above the cap anyway.
        result.score = caps[1].parse::<u64>().map(|n| n.min(100) as u8).unwrap_or(100);
    }

    if let Some(category) = labeled_value(&CATEGORY, raw) {
        result.category = category;
    }

    if let Some(tech_stack) = labeled_value(&TECH_STACK, raw) {
        result.tech_stack = tech_stack;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_urls_builds_bare_listings() {
        let jobs = scan_urls("See https://a.example/jobs/1. Also https://b.example/2, thanks");
        assert_eq!(
            jobs,
            vec![
                JobListing::new("Job Posting", "N/A", "https://a.example/jobs/1"),
                JobListing::new("Job Posting", "N/A", "https://b.example/2"),
            ]
        );
        assert!(scan_urls("no links here").is_empty());
    }

    #[test]
    fn test_parse_analysis_well_formed() {
        let result = parse_analysis("Score: 85 | Category: Backend | Tech Stack: Go, Python");
        assert_eq!(result.score, 85);
        assert_eq!(result.category, "Backend");
        assert_eq!(result.tech_stack, "Go, Python");
    }

    #[test]
    fn test_parse_analysis_clamps_score() {
        assert_eq!(parse_analysis("Score: 150").score, 100);
        assert_eq!(parse_analysis("Score: 99999999999999999999999").score, 100);
        assert_eq!(parse_analysis("Score: -5").score, 0);
        assert_eq!(parse_analysis("score:70").score, 70);
    }

    #[test]
    fn test_parse_analysis_no_fields() {
        assert_eq!(parse_analysis("no useful text"), AnalysisResult::default());
        assert_eq!(parse_analysis(""), AnalysisResult::default());
    }

    #[test]
    fn test_parse_analysis_fields_are_independent() {
        let result = parse_analysis("Tech Stack: Rust, Tokio\nCategory:   | Score: 42");
        assert_eq!(result.score, 42);
        assert_eq!(result.category, "N/A");
        assert_eq!(result.tech_stack, "Rust, Tokio");

        let result = parse_analysis("I'd rate this.\nCATEGORY: Data Engineering\nScore: 77");
        assert_eq!(result.score, 77);
        assert_eq!(result.category, "Data Engineering");
        assert_eq!(result.tech_stack, "N/A");
    }

    #[test]
    fn test_parse_listings_empty() {
        assert!(parse_listings("").is_empty());
        assert!(parse_listings("Sorry, I could not find any jobs.").is_empty());
    }

    #[test]
    fn test_parse_listings_single_bare_url() {
        let jobs = parse_listings("https://careers.example.com/jobs/42");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, "https://careers.example.com/jobs/42");
        assert_eq!(jobs[0].title, "Unknown Job");
        assert_eq!(jobs[0].company, "N/A");
    }

    #[test]
    fn test_parse_listings_numbered_with_labels() {
        let raw = "Here is what I found:\n\
            1. Title: Backend Engineer\n   Company: Spotify\n   URL: https://spotify.example/jobs/1\n\
            2. Title: Data Engineer\n   Company: Klarna\n   URL: https://klarna.example/careers/2.\n";
        let jobs = parse_listings(raw);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], JobListing::new("Backend Engineer", "Spotify", "https://spotify.example/jobs/1"));
        assert_eq!(jobs[1], JobListing::new("Data Engineer", "Klarna", "https://klarna.example/careers/2"));
    }

    #[test]
    fn test_parse_listings_title_falls_back_to_first_line() {
        let raw = "Job 1: Senior Rust Developer\nhttps://acme.example/rust\nJob 2: **Platform Engineer**\nCompany: Initech\n(https://initech.example/p)";
        let jobs = parse_listings(raw);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].title, "Senior Rust Developer");
        assert_eq!(jobs[0].company, "N/A");
        assert_eq!(jobs[1].title, "Platform Engineer");
        assert_eq!(jobs[1].company, "Initech");
        assert_eq!(jobs[1].url, "https://initech.example/p");
    }

    #[test]
    fn test_parse_listings_markdown_labels() {
        let raw = "- **Title:** Site Reliability Engineer\n  **Company:** Northvolt\n  **URL:** https://northvolt.example/jobs/sre\n";
        let jobs = parse_listings(raw);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title, "Site Reliability Engineer");
        assert_eq!(jobs[0].company, "Northvolt");
    }

    #[test]
    fn test_every_listing_has_url() {
        let raw = "1. Title: No link here\n2. Title: Has link\nhttps://a.example/x\n- nothing\n";
        let jobs = parse_listings(raw);
        assert_eq!(jobs.len(), 1);
        assert!(jobs.iter().all(|j| !j.url.is_empty()));
        assert_eq!(jobs[0].title, "Has link");
    }
}
