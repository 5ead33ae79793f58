mod catalog;
mod classifier;
mod db;
mod dom;
mod error;
mod fetcher;
mod locator;
mod model;
mod orchestrator;
mod segmenter;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use catalog::Catalog;
use db::SqliteRepository;
use fetcher::HttpFetcher;
use model::{Category, CounterRecord, RawPage};
use orchestrator::{Extractor, RecordFilter, Repository};
use settings::Settings;

#[derive(Parser)]
#[command(name = "counter_scraper", about = "Character counter guide extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Extract and store one subject's counter guide
    Run {
        subject: String,
        /// top, jungle, mid, adc or support
        #[arg(short, long)]
        role: String,
        #[arg(long)]
        patch: Option<String>,
        #[arg(long)]
        rank: Option<String>,
        /// Print the full record as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Extract many subjects sequentially, pausing between requests
    Batch {
        #[arg(short, long)]
        role: String,
        /// File with one subject per line
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long)]
        patch: Option<String>,
        #[arg(long)]
        rank: Option<String>,
        subjects: Vec<String>,
    },
    /// Classify a saved HTML page offline and print JSON (no network, no database)
    Parse {
        html: PathBuf,
        #[arg(short, long)]
        subject: String,
        #[arg(short, long, default_value = "adc")]
        role: String,
    },
    /// List stored records
    Show {
        #[arg(short, long)]
        subject: Option<String>,
        #[arg(short, long)]
        role: Option<String>,
        #[arg(long)]
        patch: Option<String>,
        #[arg(long)]
        rank: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    info!("Settings: base_url={} db={:?}", settings.base_url, settings.db_path);

    let result = match cli.command {
        Commands::Init => {
            let repo = SqliteRepository::connect(&settings.db_path)?;
            repo.init_schema()?;
            println!(
                "Schema ready at {:?} ({} records)",
                settings.db_path,
                repo.count()?
            );
            Ok(())
        }
        Commands::Run {
            subject,
            role,
            patch,
            rank,
            json,
        } => {
            let extractor = build_extractor(&settings)?;
            let record = extractor
                .run(&subject, &role, patch.as_deref(), rank.as_deref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_summary(&record);
            }
            Ok(())
        }
        Commands::Batch {
            role,
            file,
            patch,
            rank,
            subjects,
        } => {
            let mut all = match file {
                Some(path) => read_subjects(&path)?,
                None => Vec::new(),
            };
            all.extend(subjects);
            if all.is_empty() {
                bail!("No subjects given. Pass names or --file.");
            }

            println!("Extracting {} subjects as {}...", all.len(), role);
            let extractor = build_extractor(&settings)?;
            let s = extractor
                .run_batch(&all, &role, patch.as_deref(), rank.as_deref())
                .await?;
            println!(
                "Done: {} stored ({} without relations), {} exhausted, {} duplicates.",
                s.stored, s.empty, s.exhausted, s.conflicts
            );
            Ok(())
        }
        Commands::Parse {
            html,
            subject,
            role,
        } => {
            let catalog = load_catalog(&settings)?;
            let page = RawPage {
                url: fetcher::page_url(&settings.base_url, &subject),
                html: std::fs::read_to_string(&html)
                    .with_context(|| format!("Failed to read {:?}", html))?,
                fetched_at: Utc::now(),
            };
            let a = orchestrator::analyze(&page, &subject, &catalog);
            let out = serde_json::json!({
                "subjectId": model::normalize_id(&subject),
                "subjectName": subject,
                "role": role,
                "weakAgainst": a.classification.weak_against,
                "strongAgainst": a.classification.strong_against,
                "bestLaneCounters": a.classification.best_lane_counters,
                "worstLaneCounters": a.classification.worst_lane_counters,
                "content": a.sections,
                "tiers": a.classification.tiers,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Show {
            subject,
            role,
            patch,
            rank,
            limit,
        } => {
            let repo = SqliteRepository::connect(&settings.db_path)?;
            repo.init_schema()?;
            let rows = repo.find(&RecordFilter {
                subject_id: subject.as_deref().map(model::normalize_id),
                role,
                patch,
                rank,
                region: None,
                limit: Some(limit),
            })?;
            if rows.is_empty() {
                println!("No records found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<16} | {:<8} | {:<8} | {:<10} | {:>4} | {:>6} | {:>4} | {:>4} | {:>3}",
                "#", "Subject", "Role", "Patch", "Rank", "Weak", "Strong", "Best", "Wrst", "Err"
            );
            println!("{}", "-".repeat(92));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<16} | {:<8} | {:<8} | {:<10} | {:>4} | {:>6} | {:>4} | {:>4} | {:>3}",
                    i + 1,
                    truncate(&r.subject_name, 16),
                    truncate(&r.role, 8),
                    truncate(&r.patch, 8),
                    truncate(&r.rank, 10),
                    r.weak_against.len(),
                    r.strong_against.len(),
                    r.best_lane_counters.len(),
                    r.worst_lane_counters.len(),
                    r.errors.len()
                );
            }
            println!("\n{} records", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_catalog(settings: &Settings) -> anyhow::Result<Catalog> {
    let catalog = match &settings.catalog_path {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::default(),
    };
    info!("Catalog: {} characters", catalog.len());
    Ok(catalog)
}

fn build_extractor(settings: &Settings) -> anyhow::Result<Extractor<HttpFetcher, SqliteRepository>> {
    let repo = SqliteRepository::connect(&settings.db_path)?;
    repo.init_schema()?;
    let fetcher = HttpFetcher::new(settings.request_timeout())
        .context("Failed to build HTTP client")?;
    Ok(Extractor::new(fetcher, repo, load_catalog(settings)?, settings))
}

/// One subject per line; blank lines and `#` comments skipped.
fn read_subjects(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read subject list {:?}", path))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

fn print_summary(record: &CounterRecord) {
    println!(
        "{} ({}, patch {}, rank {}, {})",
        record.subject_name, record.role, record.patch, record.rank, record.region
    );
    for category in Category::ALL {
        let names: Vec<&str> = record
            .list(category)
            .iter()
            .map(|r| r.opponent_name.as_str())
            .collect();
        println!("  {:<18} {}", category.label(), names.join(", "));
    }
    if !record.errors.is_empty() {
        println!("  errors:");
        for e in &record.errors {
            println!("    {}", e);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
