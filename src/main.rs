mod ai;
mod browser;
mod config;
mod error;
mod export;
mod ledger;
mod models;
mod parser;
mod pipeline;
mod profile;
mod search;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{info, warn};
use std::collections::HashSet;
use std::path::PathBuf;

use ai::AIProvider;
use config::{Conditions, Config, DiscoveryMode};
use ledger::Ledger;
use models::{JobApplicationRecord, JobListing, SCRAPE_FAILED};
use pipeline::Pipeline;
use search::Accumulator;

#[derive(Parser)]
#[command(name = "jobscout")]
#[command(about = "Find fresh job postings, score them against your CV and draft cover letters")]
struct Cli {
    /// CV file (.txt or .pdf). Defaults to cv.txt, then cv.pdf
    #[arg(long)]
    cv: Option<PathBuf>,

    /// Job preferences file
    #[arg(long, default_value = "conditions.txt")]
    conditions: PathBuf,

    /// Output file; a .csv extension writes CSV, anything else Excel
    #[arg(short, long, default_value = "job_applications.xlsx")]
    output: PathBuf,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let cv_path = cli.cv.unwrap_or_else(profile::default_cv_path);
    let cv = match profile::read_profile(&cv_path) {
        Ok(text) => text,
        Err(e) => {
            println!("{}", e);
            println!("Please ensure cv.txt or cv.pdf exists, or pass --cv.");
            return Err(anyhow!("could not read CV"));
        }
    };

    let conditions = Conditions::load(&cli.conditions)?;
    let records = run(&config, &cv, &conditions)?;

    if records.is_empty() {
        println!(
            "No new job postings found. Try broader conditions or clear {}.",
            config.ledger_path.display()
        );
        return Ok(());
    }

    export::export(&records, &cli.output)?;

    let letters = records.iter().filter(|r| r.has_cover_letter()).count();
    let failures = records.iter().filter(|r| r.summary == SCRAPE_FAILED).count();
    println!("\nSaved {} jobs to {}", records.len(), cli.output.display());
    println!("Cover letters: {}", letters);
    if failures > 0 {
        println!("Scrape failures: {}", failures);
    }
    for record in &records {
        println!("  {:<40} {}", truncate(&record.title, 38), record.summary);
    }

    Ok(())
}

/// Discover fresh jobs and process them. Every collaborator is built before the first
/// search touches the ledger.
fn run(config: &Config, cv: &str, conditions: &Conditions) -> Result<Vec<JobApplicationRecord>> {
    let provider = ai::create_provider(&config.model)?;
    let fetcher = browser::create_fetcher(&config.fetcher)?;
    let search_provider = search::create_search_provider(&config.search_provider)?;
    let ledger = Ledger::new(config.ledger_path.clone());

    let queries = conditions.search_queries();
    info!(
        "Searching with {} ({} queries, ledger {}), model {}",
        search_provider.name(),
        queries.len(),
        ledger.path().display(),
        provider.model_name()
    );

    let candidates = Accumulator::new(search_provider.as_ref(), &ledger)
        .stop_policy(config.stop_policy)
        .max_delay(config.search_delay)
        .accumulate(&queries, config.min_jobs, config.max_per_query);

    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    println!("Found {} new postings", candidates.len());

    let jobs = match config.discovery_mode {
        DiscoveryMode::Search => candidates,
        DiscoveryMode::Model => shortlist(provider.as_ref(), cv, conditions, candidates),
    };

    Ok(Pipeline::new(provider.as_ref(), fetcher.as_ref())
        .threshold(config.score_threshold)
        .process(&jobs, cv))
}

/// Let the model pick from the search results. Falls back to the unfiltered list when
/// the model fails or its reply has no usable listings.
fn shortlist(
    provider: &dyn AIProvider,
    cv: &str,
    conditions: &Conditions,
    candidates: Vec<JobListing>,
) -> Vec<JobListing> {
    let reply = match ai::discover_jobs(provider, cv, conditions, &candidates) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Model discovery failed, using search results: {:#}", e);
            return candidates;
        }
    };

    let mut seen = HashSet::new();
    let picked: Vec<JobListing> = parser::parse_listings(&reply)
        .into_iter()
        .filter(|job| seen.insert(job.url.clone()))
        .collect();

    if picked.is_empty() {
        warn!(
            "No listings in model reply, using search results. Reply started with: {}",
            browser::truncate_chars(&reply, 500)
        );
        return candidates;
    }
    info!("Model shortlisted {} of {} postings", picked.len(), candidates.len());
    picked
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", browser::truncate_chars(s, max.saturating_sub(3)))
    }
}
