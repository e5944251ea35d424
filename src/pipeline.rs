use log::{info, warn};

use crate::ai::{self, AIProvider};
use crate::browser::{PageFetcher, truncate_chars};
use crate::models::{
    ANALYSIS_FAILED, AnalysisResult, JobApplicationRecord, JobListing, NOT_AVAILABLE, SCRAPE_FAILED,
};
use crate::parser::parse_analysis;

pub const DEFAULT_THRESHOLD: u8 = 70;
pub const MAX_COVER_LETTER_CHARS: usize = 8000;

/// Scrape, analyze and (above the threshold) write a cover letter, one job at a time.
pub struct Pipeline<'a> {
    provider: &'a dyn AIProvider,
    fetcher: &'a dyn PageFetcher,
    threshold: u8,
}

impl<'a> Pipeline<'a> {
    pub fn new(provider: &'a dyn AIProvider, fetcher: &'a dyn PageFetcher) -> Self {
        Self {
            provider,
            fetcher,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// One record per job, in input order. A failing job degrades to placeholder fields
    /// and never stops the batch.
    pub fn process(&self, jobs: &[JobListing], cv: &str) -> Vec<JobApplicationRecord> {
        let total = jobs.len();
        jobs.iter()
            .enumerate()
            .map(|(i, job)| {
                info!("--- Job {}/{}: {} ---", i + 1, total, job.title);
                self.process_one(job, cv)
            })
            .collect()
    }

    fn process_one(&self, job: &JobListing, cv: &str) -> JobApplicationRecord {
        let description = match self.fetcher.fetch(&job.url) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skip (scrape failed) {}: {}", job.url, e);
                return JobApplicationRecord::placeholder(job, SCRAPE_FAILED);
            }
        };

        let analysis = match ai::analyze_job(self.provider, job, &description, cv) {
            Ok(raw) => parse_analysis(&raw),
            Err(e) => {
                warn!("Analysis failed for {}: {:#}", job.url, e);
                return JobApplicationRecord::placeholder(job, ANALYSIS_FAILED);
            }
        };
        info!("Score {} ({})", analysis.score, analysis.category);

        let cover_letter = if analysis.score >= self.threshold {
            self.cover_letter(job, &description, cv)
        } else {
            NOT_AVAILABLE.to_string()
        };

        compose(job, analysis, cover_letter)
    }

    fn cover_letter(&self, job: &JobListing, description: &str, cv: &str) -> String {
        match ai::write_cover_letter(self.provider, job, description, cv) {
            Ok(text) => {
                let text = truncate_chars(text.trim(), MAX_COVER_LETTER_CHARS);
                if text.is_empty() {
                    warn!("Model returned an empty cover letter for {}", job.url);
                    NOT_AVAILABLE.to_string()
                } else {
                    text
                }
            }
            Err(e) => {
                warn!("Cover letter generation failed for {}: {:#}", job.url, e);
                NOT_AVAILABLE.to_string()
            }
        }
    }
}

fn compose(job: &JobListing, analysis: AnalysisResult, cover_letter: String) -> JobApplicationRecord {
    JobApplicationRecord {
        title: job.title.clone(),
        company: job.company.clone(),
        url: job.url.clone(),
        summary: analysis.summary(),
        category: analysis.category,
        tech_stack: analysis.tech_stack,
        cover_letter,
    }
}
