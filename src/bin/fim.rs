//! # fim CLI - File integrity monitoring
//!
//! Command-line front end for the fim library.
//!
//! ## Usage
//! ```bash
//! # Record a baseline of /srv/www
//! fim /srv/www init --ignore "*.log,cache/**"
//!
//! # Compare against it once, report to a file
//! fim /srv/www scan -o report.json
//!
//! # Re-scan every 60 seconds, appending NDJSON records
//! fim /srv/www monitor --interval 60 -o fim.ndjson --ndjson --append
//!
//! # Trust the current state
//! fim /srv/www accept
//! ```
//!
//! Reports go to stdout unless `-o` is given; the human-readable summary and
//! logs go to stderr.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use fim::monitor::stop_channel;
use fim::{
    ChangeSet, EmitPolicy, Fim, FimBuilder, FimError, MonitorOptions, ReportFormat, ReportSink,
    ReportTarget, ReportWriter, WalkWarning,
};
use humantime::format_duration;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// fim - detect added, removed and modified files under a directory
#[derive(Parser)]
#[command(name = "fim")]
#[command(version)]
#[command(about = "File integrity monitor: baseline a folder and detect changes")]
#[command(long_about = None)]
struct Cli {
    /// Directory to monitor
    root: PathBuf,

    /// Baseline file (defaults to ROOT/.fim_baseline.json)
    #[arg(short, long, global = true)]
    baseline: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a baseline snapshot of ROOT
    Init {
        #[command(flatten)]
        ignore: IgnoreArgs,
    },

    /// Promote the current on-disk state to the baseline
    Accept {
        #[command(flatten)]
        ignore: IgnoreArgs,
    },

    /// Compare the current state to the baseline and emit a report
    Scan {
        #[command(flatten)]
        ignore: IgnoreArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Make the scanned state the new baseline afterwards
        #[arg(long)]
        accept_baseline: bool,
    },

    /// Continuously scan and report changes
    Monitor {
        #[command(flatten)]
        ignore: IgnoreArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Seconds between the end of one scan and the start of the next
        #[arg(long, default_value_t = 15)]
        interval: u64,

        /// Stop after this many scans
        #[arg(long)]
        max_cycles: Option<usize>,

        /// Only emit reports for scans that found changes
        #[arg(long)]
        on_change: bool,
    },
}

#[derive(Args)]
struct IgnoreArgs {
    /// Ignore rules file, or comma-separated globs (e.g. "*.log,*.tmp")
    #[arg(long, value_name = "SPEC")]
    ignore: Option<String>,
}

#[derive(Args)]
struct OutputArgs {
    /// Write the report here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Emit newline-delimited JSON (one object per line)
    #[arg(long)]
    ndjson: bool,

    /// Append to the output file instead of overwriting it (pretty JSON
    /// reports accumulate in a JSON array)
    #[arg(long)]
    append: bool,
}

impl OutputArgs {
    fn target(&self) -> ReportTarget {
        let target = match &self.output {
            Some(path) => ReportTarget::file(path.clone()),
            None => ReportTarget::stdout(),
        };
        let format = if self.ndjson {
            ReportFormat::Ndjson
        } else {
            ReportFormat::JsonPretty
        };
        target.with_format(format).with_append(self.append)
    }
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Disable colors if needed
    if std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<FimError>() {
            Some(fim_error) => fim_error.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default level
fn init_logging(verbose: bool) {
    let default = if verbose { "fim=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        root,
        baseline,
        command,
        ..
    } = cli;

    match command {
        Commands::Init { ignore } => {
            let fim = open_fim(&root, baseline, &ignore, None)?;
            cmd_init(&fim)
        }
        Commands::Accept { ignore } => {
            let fim = open_fim(&root, baseline, &ignore, None)?;
            cmd_accept(&fim)
        }
        Commands::Scan {
            ignore,
            output,
            accept_baseline,
        } => {
            let fim = open_fim(&root, baseline, &ignore, output.output.as_deref())?;
            cmd_scan(&fim, output.target(), accept_baseline)
        }
        Commands::Monitor {
            ignore,
            output,
            interval,
            max_cycles,
            on_change,
        } => {
            let fim = open_fim(&root, baseline, &ignore, output.output.as_deref())?;
            let mut options = MonitorOptions::default().with_interval(Duration::from_secs(interval));
            if let Some(cycles) = max_cycles {
                options = options.with_max_cycles(cycles);
            }
            if on_change {
                options = options.with_emit(EmitPolicy::OnChange);
            }
            cmd_monitor(&fim, output.target(), options)
        }
    }
}

/// Build the facade from CLI arguments
///
/// An `--ignore` value naming an existing file replaces `.fimignore`;
/// anything else is split on commas into extra patterns.
fn open_fim(
    root: &Path,
    baseline: Option<PathBuf>,
    ignore: &IgnoreArgs,
    report_file: Option<&Path>,
) -> fim::Result<Fim> {
    let mut builder = FimBuilder::new();

    if let Some(path) = baseline {
        builder = builder.baseline_path(path);
    }

    if let Some(spec) = &ignore.ignore {
        let as_path = Path::new(spec);
        if as_path.is_file() {
            builder = builder.ignore_file(as_path.to_path_buf());
        } else {
            let patterns = spec
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.ignore_patterns(patterns);
        }
    }

    if let Some(path) = report_file {
        builder = builder.exclude_file(path.to_path_buf());
    }

    builder.build(root.to_path_buf())
}

/// Create the baseline
fn cmd_init(fim: &Fim) -> anyhow::Result<()> {
    let start = Instant::now();
    let result = fim.init()?;

    print_warnings(&result.warnings);
    println!(
        "{} Baseline created -> {}  (files tracked: {}, {})",
        "✓".green().bold(),
        fim.baseline_store().path().display().to_string().cyan(),
        result.snapshot.len(),
        format_duration(round_millis(start.elapsed()))
    );
    Ok(())
}

/// Replace the baseline with the current state
fn cmd_accept(fim: &Fim) -> anyhow::Result<()> {
    let result = fim.accept()?;

    print_warnings(&result.warnings);
    println!(
        "{} Baseline updated -> {}  (files tracked: {})",
        "✓".green().bold(),
        fim.baseline_store().path().display().to_string().cyan(),
        result.snapshot.len()
    );
    Ok(())
}

/// One-shot comparison
fn cmd_scan(fim: &Fim, target: ReportTarget, accept_baseline: bool) -> anyhow::Result<()> {
    let mut sink = SummarySink::new(ReportWriter::new(target), fim.root().to_path_buf());
    fim.scan_and_report(&mut sink, accept_baseline)?;

    if accept_baseline {
        eprintln!(
            "\n{} Baseline updated -> {}",
            "✓".green().bold(),
            fim.baseline_store().path().display().to_string().cyan()
        );
    }
    Ok(())
}

/// Interval monitoring until Ctrl-C or `--max-cycles`
fn cmd_monitor(fim: &Fim, target: ReportTarget, options: MonitorOptions) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    eprintln!(
        "{} {} every {} (Ctrl-C to stop)",
        "Monitoring".blue().bold(),
        fim.root().display().to_string().cyan(),
        format_duration(options.interval)
    );

    let mut sink = SummarySink::new(ReportWriter::new(target), fim.root().to_path_buf());
    let stats = runtime.block_on(async {
        let (handle, token) = stop_channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{}", "Stopping after the current scan...".yellow());
                handle.stop();
            }
        });
        fim.monitor(options, &mut sink, token).await
    })?;

    eprintln!(
        "\n{} {} scans, {} reports, {} with changes, {} failed",
        "Stopped:".bold(),
        stats.cycles,
        stats.reports_emitted,
        stats.cycles_with_changes,
        stats.failed_cycles
    );
    Ok(())
}

/// Prints a human summary to stderr, then forwards to the report writer
struct SummarySink {
    writer: ReportWriter,
    root: PathBuf,
    runs: usize,
}

impl SummarySink {
    fn new(writer: ReportWriter, root: PathBuf) -> Self {
        Self {
            writer,
            root,
            runs: 0,
        }
    }
}

impl ReportSink for SummarySink {
    fn emit(&mut self, changes: &ChangeSet) -> fim::Result<()> {
        self.runs += 1;
        if self.runs > 1 {
            eprintln!();
        }
        print_summary(changes, &self.root);
        self.writer.emit(changes)
    }
}

fn print_summary(changes: &ChangeSet, root: &Path) {
    eprintln!(
        "{} {}  {}",
        "Scan of".bold(),
        root.display().to_string().cyan(),
        changes.generated_at.format("%Y-%m-%d %H:%M:%SZ")
    );

    if !changes.has_changes() {
        eprintln!("{}", "No changes detected.".green());
    } else {
        for path in &changes.added {
            eprintln!("  {} {}", "+".green().bold(), path);
        }
        for path in &changes.removed {
            eprintln!("  {} {}", "-".red().bold(), path);
        }
        for path in &changes.modified {
            eprintln!("  {} {}", "*".yellow().bold(), path);
        }
        for path in &changes.metadata_changed {
            eprintln!("  {} {}", "~".cyan().bold(), path);
        }
        eprintln!(
            "{} added, {} removed, {} modified, {} metadata changed",
            changes.added.len(),
            changes.removed.len(),
            changes.modified.len(),
            changes.metadata_changed.len()
        );
    }

    print_warnings(&changes.warnings);
}

fn print_warnings(warnings: &[WalkWarning]) {
    for warning in warnings {
        eprintln!("  {} {}", "warning:".yellow().bold(), warning);
    }
}

fn round_millis(elapsed: Duration) -> Duration {
    Duration::from_millis(elapsed.as_millis() as u64)
}
