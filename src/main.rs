//! # Lorekeeper CLI
//!
//! Command-line front end for building and loading character knowledge
//! bases.
//!
//! ## Subcommands
//!
//! - `crawl`: Fetch a domain's wiki pages and persist knowledge records
//! - `import`: Submit persisted records to the RAG backend, then verify
//! - `verify`: Run presence and isolation checks without importing
//! - `merge`: Combine several crawl outputs into one deduplicated file
//! - `links`: Rank a discovered link list into crawl targets
//!
//! Domains are read from a directory of TOML files (`domains/` by default)
//! and selected by slug, name or character id.

mod telemetry;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use lorekeeper::config::{DomainConfig, load_domain_dir, select_domains};
use lorekeeper::crawler::{
    ContentExtractor, CrawlProgress, Crawler, HttpFetcher, PageOutcome, PageTarget, RecordStore,
    load_links,
};
use lorekeeper::http::{ClearOutcome, RagClient};
use lorekeeper::importer::{
    BatchImporter, ClearScope, Normalizer, REPORT_FILE, Verifier, discover_files,
    load_records_file, write_report,
};
use lorekeeper::knowledge::{CharacterId, RecordBuilder};
use lorekeeper::merge::{MergeSource, merge_sources, write_merged};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

const DEFAULT_BACKEND_URL: &str = "http://localhost:18080";

#[derive(Parser)]
#[command(author, version, about = "Crawl wiki pages into per-character knowledge bases and load them into a RAG backend", long_about = None)]
struct Cli {
    /// Directory of domain TOML files
    #[arg(long, global = true, default_value = "domains")]
    domains: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the configured pages of one or more domains
    Crawl(CrawlArgs),

    /// Import crawled knowledge into the RAG backend
    Import(ImportArgs),

    /// Check that imported knowledge is findable and isolated
    Verify(VerifyArgs),

    /// Merge several crawl outputs into one file
    Merge(MergeArgs),

    /// Turn a discovered link list into prioritized crawl targets
    Links(LinksArgs),
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Domains to crawl (slug, name or id); all when omitted
    domains: Vec<String>,

    /// Root directory for output, one subdirectory per domain
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Crawl prioritized links from this file instead of the configured targets
    #[arg(short, long)]
    links: Option<PathBuf>,

    /// Maximum number of pages to crawl per domain
    #[arg(short = 'p', long)]
    max_pages: Option<usize>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Domains to import (slug, name or id); all when omitted
    domains: Vec<String>,

    /// Base URL of the RAG backend
    #[arg(short, long, default_value = DEFAULT_BACKEND_URL)]
    url: String,

    /// Clear existing knowledge before importing: only the named domains,
    /// or everything when no domains are named
    #[arg(long)]
    clear: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,

    /// Read data from this directory instead of each domain's output directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Where to write the Markdown report
    #[arg(short, long, default_value = REPORT_FILE)]
    report: PathBuf,

    /// Skip post-import verification
    #[arg(long)]
    no_verify: bool,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Domains to verify (slug, name or id); all when omitted
    domains: Vec<String>,

    /// Base URL of the RAG backend
    #[arg(short, long, default_value = DEFAULT_BACKEND_URL)]
    url: String,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Sources as LABEL=PATH, in priority order
    #[arg(short, long = "source", required = true)]
    sources: Vec<MergeSource>,

    /// Merged output file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct LinksArgs {
    /// Link list written by a discovery crawl
    #[arg(short, long)]
    input: PathBuf,

    /// Domain whose link weights apply
    #[arg(short, long)]
    domain: String,

    /// Write targets as JSON to this file instead of printing them
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let _otel = telemetry::init_tracing_subscriber()?;

    let success = match cli.command {
        Some(Commands::Crawl(args)) => crawl_command(&cli.domains, args).await?,
        Some(Commands::Import(args)) => import_command(&cli.domains, args).await?,
        Some(Commands::Verify(args)) => verify_command(&cli.domains, args).await?,
        Some(Commands::Merge(args)) => merge_command(args).await?,
        Some(Commands::Links(args)) => links_command(&cli.domains, args).await?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["lorekeeper", "--help"]);
            true
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn load_selected(dir: &Path, keys: &[String]) -> anyhow::Result<Vec<DomainConfig>> {
    let domains = load_domain_dir(dir)
        .await
        .with_context(|| format!("Failed to load domains from {}", dir.display()))?;
    Ok(select_domains(&domains, keys)?
        .into_iter()
        .cloned()
        .collect())
}

#[instrument(skip(domains_dir))]
async fn crawl_command(domains_dir: &Path, args: CrawlArgs) -> anyhow::Result<bool> {
    let domains = load_selected(domains_dir, &args.domains).await?;
    if args.links.is_some() && domains.len() != 1 {
        bail!("--links needs exactly one domain");
    }

    for domain in domains {
        let profile = &domain.domain;
        println!("Crawling {} ({})...", profile.name, profile.character_id);

        let mut crawl = domain.crawl.clone();
        if let Some(max_pages) = args.max_pages {
            crawl.max_pages = max_pages;
        }
        let output_dir = match &args.output {
            Some(root) => root.join(&profile.slug),
            None => domain.output_dir(),
        };

        let targets: Vec<PageTarget> = match &args.links {
            Some(path) => domain.links.prioritize(&load_links(path).await?),
            None => domain.targets.clone(),
        };
        if targets.is_empty() {
            warn!("No targets for {}, skipping", profile.slug);
            continue;
        }

        let fetcher = HttpFetcher::new(&crawl)?;
        let extractor = ContentExtractor::new(domain.extraction.clone())?;
        let store = RecordStore::open(&output_dir, profile, crawl.output_format).await?;
        let mut crawler = Crawler::new(
            fetcher,
            extractor,
            RecordBuilder::new(profile.clone()),
            store,
            crawl.clone(),
        );

        let total = match crawl.max_pages {
            0 => targets.len(),
            n => n.min(targets.len()),
        };

        // Create a channel for progress updates
        let (progress_sender, mut progress_receiver) = mpsc::channel::<CrawlProgress>(100);

        let progress_bar = ProgressBar::new(total as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
                .progress_chars("##-"),
        );

        let progress_handle = tokio::spawn({
            let progress_bar = progress_bar.clone();
            async move {
                while let Some(progress) = progress_receiver.recv().await {
                    progress_bar.inc(1);
                    let mark = match progress.outcome {
                        PageOutcome::Accepted => "saved",
                        PageOutcome::Rejected(_) => "skipped",
                    };
                    progress_bar.set_message(format!("{} {}", mark, progress.title));
                }
                progress_bar.finish_with_message("Crawl completed");
            }
        });

        let shutdown = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let report = crawler
            .run_until(&targets, Some(progress_sender), shutdown)
            .await?;
        let _ = progress_handle.await;

        println!(
            "{}: {} saved, {} failed, {} duplicate, {} too short ({:.1}% success)",
            profile.name,
            report.stats.success,
            report.stats.failed,
            report.stats.duplicate,
            report.stats.too_short,
            report.success_rate
        );
        println!("Output written to {}", output_dir.display());

        if report.interrupted {
            println!("Interrupted, partial results saved");
            break;
        }
    }

    Ok(true)
}

#[instrument(skip(domains_dir))]
async fn import_command(domains_dir: &Path, args: ImportArgs) -> anyhow::Result<bool> {
    let domains = load_selected(domains_dir, &args.domains).await?;
    let client = RagClient::new(args.url.clone())?;

    if !client.health().await {
        error!("Backend at {} is not healthy", args.url);
        return Ok(false);
    }
    info!("Backend at {} is healthy", args.url);

    let importer = BatchImporter::new(client);

    if args.clear {
        let scope = ClearScope::for_selection(!args.domains.is_empty(), &domains);
        let target = match &scope {
            ClearScope::All => "all knowledge".to_string(),
            ClearScope::Characters(_) => {
                let names: Vec<String> = domains
                    .iter()
                    .map(|d| format!("{} ({})", d.domain.name, d.domain.character_id))
                    .collect();
                format!("the knowledge of {}", names.join(", "))
            }
        };
        let confirmed = args.yes
            || Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Clear {} stored at {}?", target, args.url))
                .default(false)
                .interact()?;
        if !confirmed {
            println!("Import cancelled");
            return Ok(false);
        }
        match importer.clear(&scope).await? {
            ClearOutcome::Cleared => info!("Cleared {}", target),
            ClearOutcome::Unsupported => warn!("Backend could not clear {}, continuing", target),
        }
    }

    let mut results = Vec::new();
    for domain in &domains {
        let data_dir = match &args.data_dir {
            Some(root) => root.join(&domain.domain.slug),
            None => domain.import_dir(),
        };
        match importer.import_domain(domain, &data_dir).await {
            Ok(result) => {
                println!(
                    "{}: {}/{} records imported ({:.1}%) in {:.1}s",
                    result.name,
                    result.imported,
                    result.total_records,
                    result.success_rate(),
                    result.elapsed.as_secs_f64()
                );
                results.push(result);
            }
            Err(e) => error!("Import of {} failed: {}", domain.domain.name, e),
        }
    }

    let verification = if args.no_verify {
        None
    } else {
        let imported: BTreeMap<CharacterId, Vec<String>> = results
            .iter()
            .map(|r| (r.character_id, r.imported_titles.clone()))
            .collect();
        Some(Verifier::new(importer.client()).verify(&domains, &imported).await)
    };

    write_report(&args.report, &results, verification.as_ref()).await?;
    println!("Report written to {}", args.report.display());

    let imported_all = results.len() == domains.len() && results.iter().all(|r| r.failed == 0);
    let verified = verification.as_ref().is_none_or(|v| v.passed());
    if let Some(verification) = &verification {
        for check in verification.failures() {
            println!("Check failed for {} / '{}'", check.domain, check.query);
        }
    }
    Ok(imported_all && verified)
}

#[instrument(skip(domains_dir))]
async fn verify_command(domains_dir: &Path, args: VerifyArgs) -> anyhow::Result<bool> {
    let domains = load_selected(domains_dir, &args.domains).await?;
    let client = RagClient::new(args.url.clone())?;
    if !client.health().await {
        error!("Backend at {} is not healthy", args.url);
        return Ok(false);
    }

    // Titles come from the local data, since nothing was imported in this run
    let mut titles = BTreeMap::new();
    for domain in &domains {
        titles.insert(domain.domain.character_id, local_titles(domain).await);
    }

    let report = Verifier::new(&client).verify(&domains, &titles).await;
    for (kind, check) in report
        .presence
        .iter()
        .map(|c| ("presence", c))
        .chain(report.isolation.iter().map(|c| ("isolation", c)))
    {
        println!("{:<9} {} / '{}': {:?}", kind, check.domain, check.query, check.status);
    }
    Ok(report.passed())
}

/// Titles of the records an import of `domain` would submit
async fn local_titles(domain: &DomainConfig) -> Vec<String> {
    let data_dir = domain.import_dir();
    let files = match discover_files(&data_dir, &domain.import.files).await {
        Ok(files) => files,
        Err(e) => {
            warn!("No local data for {}: {}", domain.domain.slug, e);
            return Vec::new();
        }
    };
    let normalizer = Normalizer::new(&domain.domain, domain.import.schemas.clone());
    let mut titles = Vec::new();
    for path in files {
        if let Ok(items) = load_records_file(&path).await {
            titles.extend(
                items
                    .iter()
                    .filter_map(|item| normalizer.normalize(item))
                    .map(|record| record.title),
            );
        }
    }
    titles
}

#[instrument]
async fn merge_command(args: MergeArgs) -> anyhow::Result<bool> {
    let outcome = merge_sources(&args.sources).await;
    let report_path = write_merged(&outcome, &args.output).await?;

    for (label, count) in &outcome.report.source_statistics {
        println!("{}: {} records", label, count);
    }
    println!(
        "Merged {} records into {} (report: {})",
        outcome.report.total_records,
        args.output.display(),
        report_path.display()
    );
    Ok(true)
}

#[instrument(skip(domains_dir))]
async fn links_command(domains_dir: &Path, args: LinksArgs) -> anyhow::Result<bool> {
    let domains = load_selected(domains_dir, std::slice::from_ref(&args.domain)).await?;
    let Some(domain) = domains.first() else {
        bail!("Unknown domain '{}'", args.domain);
    };

    let links = load_links(&args.input).await?;
    let targets = domain.links.prioritize(&links);

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, serde_json::to_string_pretty(&targets)?).await?;
            println!(
                "Wrote {} of {} links as targets to {}",
                targets.len(),
                links.len(),
                path.display()
            );
        }
        None => {
            for (i, target) in targets.iter().enumerate() {
                println!("{}. [{}] {} -> {}", i + 1, target.category, target.title, target.url);
            }
        }
    }
    Ok(true)
}
