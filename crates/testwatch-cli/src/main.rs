mod executor;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use executor::ShellExecutor;
use testwatch_core::editor::decode_file_reference;
use testwatch_core::model::{ProjectId, SuiteId, TestId};
use testwatch_core::{Admission, Config, Engine, FileStore, LogNotifier, Recorded, Store};

#[derive(Parser)]
#[command(name = "testwatch")]
#[command(about = "Continuously discover, queue and run tests", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./testwatch.toml, then the user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize every suite with the disk
    Sync,
    /// Queue tests for execution
    Queue {
        /// Only tests of this suite
        #[arg(long)]
        suite: Option<u64>,
    },
    /// Queue a single test, enabling it if needed
    Run {
        #[arg(long)]
        test: u64,
        /// Requeue the test even if it is already running
        #[arg(long)]
        force: bool,
    },
    /// Run queued tests, synchronizing on the poll interval
    Work {
        /// Run the queue once and exit
        #[arg(long)]
        once: bool,
    },
    /// Show the latest result of every test
    Status {
        #[arg(long)]
        project: Option<u64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deliver pending notifications
    Notify {
        #[arg(long)]
        project: u64,
    },
    /// Return tests to idle and empty their queue entries
    Reset {
        #[arg(long)]
        project: Option<u64>,
    },
    /// Delete every stored run
    ClearRuns,
    /// Print the editor command for a file from test output
    EditCommand {
        #[arg(long)]
        suite: u64,
        #[arg(long)]
        file: String,
        /// The file name is hex-encoded, as in output links
        #[arg(long)]
        hex: bool,
        #[arg(long)]
        line: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::init()?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => Config::load()?,
    };

    let store = Arc::new(FileStore::with_config(&config.storage)?);
    let engine = Arc::new(Engine::new(store, config)?);

    let report = engine.reconcile()?;
    for message in &report.messages {
        warn!("{}", message);
    }

    match cli.command {
        Commands::Sync => {
            let report = engine.sync_all()?;
            for message in &report.messages {
                println!("{}", message);
            }
            println!(
                "Created {}, updated {}, deleted {}, queued {}",
                report.created, report.updated, report.deleted, report.admitted
            );
        }
        Commands::Queue { suite } => {
            let queued = match suite {
                Some(id) => engine.queue().queue_suite(SuiteId(id))?,
                None => engine.queue().queue_all()?,
            };
            println!("Queued {} tests", queued);
        }
        Commands::Run { test, force } => match engine.queue().run_test(TestId(test), force)? {
            Admission::Queued => println!("Queued test {}", test),
            Admission::AlreadyEnqueued => println!("Test {} is already queued", test),
            Admission::Disabled => println!("Test {} belongs to a disabled project", test),
            Admission::Missing => return Err(eyre!("no test with id {}", test)),
        },
        Commands::Work { once } => work(engine, once).await?,
        Commands::Status { project, json } => {
            let results = engine.latest_results(project.map(ProjectId))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No tests found. Use 'testwatch sync' to discover them.");
            } else {
                for result in &results {
                    println!(
                        "{:<8} {:>5}  {}/{}  {}",
                        result.state().as_str(),
                        result.test.id.0,
                        result.project_name,
                        result.suite_name,
                        result.test.name
                    );
                }
            }
        }
        Commands::Notify { project } => {
            let delivered = engine.notify(&LogNotifier, Some(ProjectId(project))).await?;
            println!("Delivered {} results", delivered);
        }
        Commands::Reset { project } => {
            let reset = engine.queue().reset_all(project.map(ProjectId))?;
            println!("Reset {} tests", reset);
        }
        Commands::ClearRuns => {
            let cleared = engine.store().clear_runs()?;
            println!("Deleted {} runs", cleared);
        }
        Commands::EditCommand {
            suite,
            file,
            hex,
            line,
        } => {
            let file = if hex {
                decode_file_reference(&file)
                    .ok_or_else(|| eyre!("not a hex-encoded file name: {}", file))?
            } else {
                file
            };
            println!("{}", engine.edit_command(SuiteId(suite), &file, line)?);
        }
    }

    Ok(())
}

/// Synchronizes on the poll interval and drains the queue in between.
async fn work(engine: Arc<Engine<FileStore>>, once: bool) -> Result<()> {
    let executor = ShellExecutor::default();
    let interval = Duration::from_secs(engine.config().watcher.poll_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let syncing = Arc::clone(&engine);
        let report = tokio::task::spawn_blocking(move || syncing.sync_all()).await??;
        if !report.is_unchanged() {
            info!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                queued = report.admitted,
                "synchronized"
            );
        }
        for message in &report.messages {
            warn!("{}", message);
        }

        let mut ran = 0;
        while let Some(recorded) = engine.tick(&executor).await? {
            ran += 1;
            if recorded == Recorded::TestMissing {
                warn!("test disappeared while running, result discarded");
            }
        }

        if ran > 0 && engine.config().watcher.notify {
            engine.notify(&LogNotifier, None).await?;
        }

        if once {
            return Ok(());
        }
    }
}
