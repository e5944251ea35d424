use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Job";
pub const FALLBACK_TITLE: &str = "Job Posting";
pub const NOT_AVAILABLE: &str = "N/A";
pub const SCRAPE_FAILED: &str = "Scrape failed";
pub const ANALYSIS_FAILED: &str = "Analysis failed";

/// A discovered posting. `url` is the identity used by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    pub url: String,
}

impl JobListing {
    pub fn new(title: impl Into<String>, company: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            url: url.into(),
        }
    }
}

/// One hit from a search provider. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Ledger row: a url and the day it was first discovered (YYYY-MM-DD).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedRecord {
    pub url: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub score: u8, // 0 - 100
    pub category: String,
    pub tech_stack: String,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            score: 0,
            category: NOT_AVAILABLE.to_string(),
            tech_stack: NOT_AVAILABLE.to_string(),
        }
    }
}

impl AnalysisResult {
    pub fn summary(&self) -> String {
        format!("Score: {}. {}. Tech: {}", self.score, self.category, self.tech_stack)
    }
}

/// Final output row, one per processed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplicationRecord {
    #[serde(rename = "Job Title")]
    pub title: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Summary")]
    pub summary: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Tech Stack")]
    pub tech_stack: String,
    #[serde(rename = "Cover Letter")]
    pub cover_letter: String,
}

impl JobApplicationRecord {
    /// Record for a job whose later steps never ran: every derived field is "N/A".
    pub fn placeholder(job: &JobListing, summary: &str) -> Self {
        Self {
            title: job.title.clone(),
            company: job.company.clone(),
            url: job.url.clone(),
            summary: summary.to_string(),
            category: NOT_AVAILABLE.to_string(),
            tech_stack: NOT_AVAILABLE.to_string(),
            cover_letter: NOT_AVAILABLE.to_string(),
        }
    }

    pub fn has_cover_letter(&self) -> bool {
        self.cover_letter != NOT_AVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_summary_format() {
        let analysis = AnalysisResult {
            score: 85,
            category: "Backend".to_string(),
            tech_stack: "Go, Python".to_string(),
        };
        assert_eq!(analysis.summary(), "Score: 85. Backend. Tech: Go, Python");
        assert_eq!(AnalysisResult::default().summary(), "Score: 0. N/A. Tech: N/A");
    }

    #[test]
    fn test_placeholder_record() {
        let job = JobListing::new("Engineer", "Acme", "https://acme.example/jobs/1");
        let record = JobApplicationRecord::placeholder(&job, SCRAPE_FAILED);
        assert_eq!(record.summary, "Scrape failed");
        assert_eq!(record.cover_letter, "N/A");
        assert!(!record.has_cover_letter());
    }
}
