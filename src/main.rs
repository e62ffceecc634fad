mod assets;
mod convert;
mod error;
mod mapping;
mod reconcile;
mod records;
mod scraper;
mod settings;
mod slug;
mod steps;
mod store;
mod sync;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::scraper::{Fetcher, ScrapeStats};
use crate::settings::Settings;
use crate::steps::Generated;
use crate::store::SanityCli;
use crate::sync::SyncOptions;

#[derive(Parser)]
#[command(name = "blog-migrate", about = "Migrate blog CSV exports into Sanity")]
struct Cli {
    /// Settings file (default: ./migrate.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect author image URLs from authors.csv
    AuthorImages,
    /// Scrape title, description and og:image for every post website
    Scrape,
    /// Collect only og:image URLs for every post website
    OgImages,
    /// Download scraped images and upload them as Sanity assets
    UploadImages,
    /// Convert CSV exports (plus scraped data and assets) into NDJSON
    Convert,
    /// Show what an update would delete, without changing the dataset
    Diff {
        /// Allow planning deletion of every document of a type
        #[arg(long)]
        allow_empty: bool,
    },
    /// Full differential update: gather, convert, import, delete orphans
    Update {
        /// Skip scraping and uploads; reuse existing side files
        #[arg(long)]
        offline: bool,
        /// Compute the plan but do not import or delete
        #[arg(long)]
        dry_run: bool,
        /// Allow deleting every document of a type when none were generated
        #[arg(long)]
        allow_empty: bool,
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
    let settings = Settings::load(cli.config.as_deref())?;
    info!(work_dir = %settings.paths.work_dir.display(), dataset = %settings.sanity.dataset, "Loaded settings");

    let result = match cli.command {
        Commands::AuthorImages => {
            let n = steps::author_images(&settings)?;
            println!("author_image_mapping.json created ({} authors with images).", n);
            Ok(())
        }
        Commands::Scrape => {
            let fetcher = Fetcher::new(&settings.http)?;
            let stats = steps::scrape(&settings, &fetcher).await?;
            print_scrape("scraped_data.json", &stats);
            Ok(())
        }
        Commands::OgImages => {
            let fetcher = Fetcher::new(&settings.http)?;
            let stats = steps::og_images(&settings, &fetcher).await?;
            print_scrape("image_mapping.json", &stats);
            Ok(())
        }
        Commands::UploadImages => {
            let token = settings::api_token()?;
            let fetcher = Fetcher::new(&settings.http)?;
            let (posts, authors) = steps::upload_images(&settings, &fetcher, token).await?;
            println!(
                "Uploaded {} post images ({} skipped, {} errors), {} author images ({} errors).",
                posts.uploaded, posts.skipped, posts.errors, authors.uploaded, authors.errors
            );
            Ok(())
        }
        Commands::Convert => {
            let generated = steps::convert(&settings, &now())?;
            print_generated(&generated);
            Ok(())
        }
        Commands::Diff { allow_empty } => {
            let generated = steps::convert(&settings, &now())?;
            print_generated(&generated);
            let opts = SyncOptions {
                dry_run: true,
                allow_empty,
            };
            run_sync(&settings, &generated, opts).await
        }
        Commands::Update {
            offline,
            dry_run,
            allow_empty,
        } => {
            if !offline {
                let token = settings::api_token()?;
                let fetcher = Fetcher::new(&settings.http)?;

                println!("--- Step 1: Fetching and generating data ---");
                steps::author_images(&settings)?;
                let stats = steps::scrape(&settings, &fetcher).await?;
                print_scrape("scraped_data.json", &stats);
                let (posts, authors) = steps::upload_images(&settings, &fetcher, token).await?;
                println!(
                    "Uploaded {} post images, {} author images.",
                    posts.uploaded, authors.uploaded
                );
            }

            println!("\n--- Step 2: Converting data to NDJSON ---");
            let generated = steps::convert(&settings, &now())?;
            print_generated(&generated);

            println!("\n--- Step 3: Syncing with Sanity ---");
            run_sync(&settings, &generated, SyncOptions { dry_run, allow_empty }).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_sync(settings: &Settings, generated: &Generated, opts: SyncOptions) -> anyhow::Result<()> {
    let store = SanityCli::new(&settings.sanity);
    let report = sync::sync(&store, generated, opts).await;
    report.print();

    let blocked: Vec<String> = report
        .blocked()
        .iter()
        .map(|o| o.doc_type.to_string())
        .collect();
    if let Some(err) = report.failed {
        if blocked.is_empty() {
            return Err(err);
        }
        return Err(err.context(format!("deletions skipped for: {}", blocked.join(", "))));
    }
    if !blocked.is_empty() {
        bail!("deletions skipped for: {}", blocked.join(", "));
    }
    if report.imported {
        println!("\nSanity update completed successfully.");
    }
    Ok(())
}

/// One timestamp per run, shared by every post.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn print_scrape(file: &str, stats: &ScrapeStats) {
    println!(
        "{} created: {} of {} posts with data ({} skipped, {} errors).",
        file, stats.found, stats.total, stats.skipped, stats.errors
    );
}

fn print_generated(generated: &Generated) {
    println!(
        "Generated {} author documents -> {}",
        generated.authors.len(),
        generated.authors_file.display()
    );
    println!(
        "Generated {} post documents -> {}",
        generated.posts.len(),
        generated.posts_file.display()
    );
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
