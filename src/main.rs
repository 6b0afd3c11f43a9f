//! docharvest - download portal documents and sort them by category
//!
//! `fetch` drives a WebDriver browser through the portal, `sort` groups the
//! downloads into per-category zips, `run` does both, and `pending` shows
//! what a fetch would try.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docharvest::archive::{sort_from_file, SortLayout};
use docharvest::browser::{firefox_capabilities, WebDriverClient, DEFAULT_WEBDRIVER_URL};
use docharvest::clock::TokioClock;
use docharvest::config::{FetchSettings, PortalProfile};
use docharvest::credentials::Credentials;
use docharvest::fetch::{FailureLog, RunSummary, Session};
use docharvest::metadata::{load_wanted, select_pending, PendingSelection, SubmissionTable, TableSchema};
use docharvest::naming::{downloaded_ids, DocumentId};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docharvest")]
#[command(version)]
#[command(about = "Download documents from a review portal and sort them into per-category archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log into the portal and download every pending document
    Fetch {
        #[command(flatten)]
        paths: PathArgs,
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Group downloaded documents by category into folders and zips
    Sort {
        #[command(flatten)]
        paths: PathArgs,
        #[command(flatten)]
        sort: SortArgs,
    },

    /// Fetch, then sort
    Run {
        #[command(flatten)]
        paths: PathArgs,
        #[command(flatten)]
        select: SelectArgs,
        #[command(flatten)]
        browser: BrowserArgs,
        #[command(flatten)]
        sort: SortArgs,
    },

    /// List the documents a fetch would try, without opening a browser
    Pending {
        #[command(flatten)]
        paths: PathArgs,
        #[command(flatten)]
        select: SelectArgs,
    },
}

#[derive(Args)]
struct PathArgs {
    /// Directory the browser saves documents into
    #[arg(short, long, env = "DOCHARVEST_DOWNLOAD_DIR", default_value = "downloads")]
    download_dir: PathBuf,

    /// Submissions metadata CSV
    #[arg(short, long, env = "DOCHARVEST_SUBMISSIONS", default_value = "submission.csv")]
    submissions: PathBuf,
}

#[derive(Args)]
struct SelectArgs {
    /// CSV listing the wanted document IDs
    #[arg(short, long, env = "DOCHARVEST_WANTED")]
    wanted: Option<PathBuf>,

    /// Fetch this ID (repeatable; bypasses the wanted list)
    #[arg(long = "id")]
    ids: Vec<DocumentId>,

    /// Skip submissions whose decision starts with this prefix
    #[arg(long, default_value = "DR")]
    exclude_status: String,
}

#[derive(Args)]
struct BrowserArgs {
    /// Portal profile (URLs, selectors, timings)
    #[arg(long, env = "DOCHARVEST_PORTAL", default_value = "portal.json")]
    portal: PathBuf,

    /// YAML file with login.username / login.password
    #[arg(long, env = "DOCHARVEST_CREDENTIALS", default_value = "credentials.yaml")]
    credentials: PathBuf,

    /// WebDriver endpoint (geckodriver)
    #[arg(long, env = "DOCHARVEST_WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    /// Append-only log of failed downloads
    #[arg(long, env = "DOCHARVEST_FAILED_LOG", default_value = "failed.txt")]
    failed_log: PathBuf,

    /// Page markup written when the download control misbehaves
    #[arg(long, env = "DOCHARVEST_DEBUG_DUMP", default_value = "page_source.html")]
    debug_dump: PathBuf,

    /// Firefox binary to launch instead of the system default
    #[arg(long, env = "DOCHARVEST_FIREFOX_BINARY")]
    firefox_binary: Option<PathBuf>,

    /// Run Firefox without a window
    #[arg(long)]
    headless: bool,
}

#[derive(Args)]
struct SortArgs {
    /// Receives one folder and one zip per category
    #[arg(long, env = "DOCHARVEST_SORTED_DIR", default_value = "sorted")]
    sorted_dir: PathBuf,

    /// Copy documents from here instead of the download directory
    #[arg(long, env = "DOCHARVEST_SOURCE_DIR")]
    source_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "docharvest=debug".parse()? } else { "docharvest=warn".parse()? }),
            )
            .init();
    }

    match cli.command {
        Commands::Fetch { paths, select, browser } => {
            fetch(&paths, &select, &browser).await?;
        }

        Commands::Sort { paths, sort } => {
            sort_downloads(&paths, &sort)?;
        }

        Commands::Run {
            paths,
            select,
            browser,
            sort,
        } => {
            fetch(&paths, &select, &browser).await?;
            sort_downloads(&paths, &sort)?;
        }

        Commands::Pending { paths, select } => {
            let (ids, selection) = resolve_ids(&paths, &select)?;

            if let Some(selection) = selection {
                print_selection(&selection);
                println!();
            }
            for id in &ids {
                println!("{}", id);
            }
            eprintln!("\nTotal: {} pending", ids.len());
        }
    }

    Ok(())
}

/// Work out which IDs to fetch: explicit `--id`s win over the wanted list
fn resolve_ids(paths: &PathArgs, select: &SelectArgs) -> Result<(Vec<DocumentId>, Option<PendingSelection>)> {
    if !select.ids.is_empty() {
        return Ok((select.ids.clone(), None));
    }

    let Some(wanted_path) = &select.wanted else {
        bail!("Nothing to fetch: pass --wanted <csv> or at least one --id");
    };

    let schema = TableSchema::default();
    let wanted = load_wanted(wanted_path, &schema)
        .with_context(|| format!("Failed to load wanted list {}", wanted_path.display()))?;
    let table = SubmissionTable::load(&paths.submissions, &schema)
        .with_context(|| format!("Failed to load submissions {}", paths.submissions.display()))?;
    let downloaded = downloaded_ids(&paths.download_dir)
        .with_context(|| format!("Failed to scan {}", paths.download_dir.display()))?;

    let selection = select_pending(&wanted, &table, &downloaded, &select.exclude_status);
    Ok((selection.ids.clone(), Some(selection)))
}

fn print_selection(selection: &PendingSelection) {
    println!("=== Pending Selection ===");
    println!("Wanted:             {}", selection.original);
    println!("Already downloaded: {}", selection.already_downloaded);
    println!("Excluded by status: {}", selection.excluded);
    println!("Not in submissions: {}", selection.unknown);
    println!("Remaining:          {}", selection.ids.len());
}

async fn fetch(paths: &PathArgs, select: &SelectArgs, args: &BrowserArgs) -> Result<RunSummary> {
    let (ids, selection) = resolve_ids(paths, select)?;
    if let Some(selection) = &selection {
        print_selection(selection);
        println!();
    }
    if ids.is_empty() {
        println!("Nothing to download.");
        return Ok(RunSummary::default());
    }

    let portal = PortalProfile::load(&args.portal)
        .with_context(|| format!("Failed to load portal profile {}", args.portal.display()))?;
    let credentials = Credentials::load(&args.credentials)
        .with_context(|| format!("Failed to load credentials {}", args.credentials.display()))?;

    let settings = FetchSettings {
        download_dir: paths.download_dir.clone(),
        failure_log: args.failed_log.clone(),
        debug_dump: args.debug_dump.clone(),
    };
    settings.validate()?;
    let failures = FailureLog::open(&settings.failure_log)?;

    // Firefox wants an absolute download folder
    let download_dir = std::fs::canonicalize(&settings.download_dir)
        .with_context(|| format!("Failed to resolve {}", settings.download_dir.display()))?;
    let capabilities = firefox_capabilities(&download_dir, args.firefox_binary.as_deref(), args.headless);

    println!("Connecting to WebDriver at {}...", args.webdriver_url);
    let client = WebDriverClient::connect(&args.webdriver_url, capabilities)
        .await
        .with_context(|| format!("Failed to open a browser session at {}", args.webdriver_url))?;

    let mut session = Session::new(client, TokioClock, portal, settings, failures);

    let pb = ProgressBar::new(ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let result = match session.login(&credentials).await {
        Ok(()) => session.run(&ids, &pb).await,
        Err(e) => Err(e),
    };
    pb.finish_and_clear();

    let mut client = session.into_browser();
    if let Err(e) = client.quit().await {
        warn!("Failed to close browser session: {}", e);
    }

    let summary = result?;

    println!("\n=== Download Summary ===");
    println!("Downloaded: {}", summary.succeeded().len());
    println!("Timed out:  {}", summary.timed_out().len());
    println!("Not found:  {}", summary.not_found().len());
    println!("Failed:     {}", summary.failed().len());

    let retry: Vec<String> = summary
        .timed_out()
        .into_iter()
        .chain(summary.failed())
        .map(|id| id.to_string())
        .collect();
    if !retry.is_empty() {
        println!("\nLogged to {}: {}", args.failed_log.display(), retry.join(", "));
    }

    Ok(summary)
}

fn sort_downloads(paths: &PathArgs, args: &SortArgs) -> Result<()> {
    let mut layout = SortLayout::new(&paths.download_dir, &args.sorted_dir);
    if let Some(source) = &args.source_dir {
        layout.source_dir = source.clone();
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} groups | {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let report = sort_from_file(&paths.submissions, &TableSchema::default(), &layout, &pb)
        .with_context(|| format!("Failed to sort {}", paths.download_dir.display()))?;
    pb.finish_and_clear();

    println!("\n=== Sort Summary ===");
    for group in &report.groups {
        println!(
            "{:<30} {:>4} copied, {:>3} missing -> {}",
            group.name,
            group.copied.len(),
            group.missing.len(),
            group.archive.display()
        );
    }
    let missing: usize = report.groups.iter().map(|g| g.missing.len()).sum();
    if missing > 0 {
        println!("\n{} files listed in the metadata were not found.", missing);
    } else {
        println!("\nSort complete!");
    }

    Ok(())
}
