//! Command-line driver for exercising page lock contention.
#![forbid(unsafe_code)]

#[path = "pagesync/config.rs"]
mod config;

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use pagesync::{
    logging, LockOptions, MemoryPage, MemoryPageManager, PageId, PageLockManager, PageManager,
    PageSyncError, SynchronizedPageManager, ThreadDumpStrategy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use config::{CliConfig, ContendSection, Settings};

const DEFAULT_THREADS: usize = 8;
const DEFAULT_PAGES: u64 = 4;
const DEFAULT_REQUESTS: usize = 200;
const DEFAULT_HOLD_MS: u64 = 1;
const DEFAULT_SEED: u64 = 0x5eed;
const MAX_PAGES: u64 = 1 << 16;

#[derive(Parser, Debug)]
#[command(
    name = "pagesync",
    version,
    about = "Page lock contention driver",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "PAGESYNC_CONFIG",
        value_name = "FILE",
        help = "Config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log filter, e.g. info or pagesync=debug"
    )]
    log: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for reports"
    )]
    format: OutputFormat,

    #[command(flatten)]
    locks: LockArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct LockArgs {
    #[arg(long, global = true, help = "Page lock timeout in milliseconds")]
    timeout_ms: Option<u64>,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "Diagnostics to dump when a lock times out"
    )]
    thread_dump: Option<ThreadDumpArg>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run worker threads that fetch, touch and detach pages concurrently.
    Contend(ContendCmd),
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug)]
struct ContendCmd {
    #[arg(long, help = "Number of worker threads")]
    threads: Option<usize>,

    #[arg(long, help = "Number of distinct pages")]
    pages: Option<u64>,

    #[arg(long, help = "Requests issued by each worker")]
    requests: Option<usize>,

    #[arg(long, help = "Time each request holds its page, in milliseconds")]
    hold_ms: Option<u64>,

    #[arg(long, help = "Seed for page selection")]
    seed: Option<u64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ThreadDumpArg {
    None,
    Holder,
    All,
}

impl From<ThreadDumpArg> for ThreadDumpStrategy {
    fn from(value: ThreadDumpArg) -> Self {
        match value {
            ThreadDumpArg::None => ThreadDumpStrategy::NoThreads,
            ThreadDumpArg::Holder => ThreadDumpStrategy::ThreadHoldingLock,
            ThreadDumpArg::All => ThreadDumpStrategy::AllThreads,
        }
    }
}

impl From<ThreadDumpStrategy> for ThreadDumpArg {
    fn from(value: ThreadDumpStrategy) -> Self {
        match value {
            ThreadDumpStrategy::NoThreads => ThreadDumpArg::None,
            ThreadDumpStrategy::ThreadHoldingLock => ThreadDumpArg::Holder,
            ThreadDumpStrategy::AllThreads => ThreadDumpArg::All,
        }
    }
}

#[derive(Debug, Clone)]
struct Workload {
    threads: usize,
    pages: u64,
    requests: usize,
    hold: Duration,
    seed: u64,
}

#[derive(Debug, Default, Serialize)]
struct ContendReport {
    threads: usize,
    pages: u64,
    requests: usize,
    acquired: usize,
    misses: usize,
    timeouts: usize,
    violations: usize,
    max_wait_ms: u64,
    elapsed_ms: u64,
    timeout_ms: u64,
}

#[derive(Debug, Default)]
struct WorkerStats {
    acquired: usize,
    misses: usize,
    timeouts: usize,
    violations: usize,
    max_wait: Duration,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init_logging(&cli.log) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = CliConfig::load(cli.config.clone())?;
    let settings = config.settings();
    let options = lock_options(&cli.locks, settings);

    match cli.command {
        Command::Contend(cmd) => {
            let workload = build_workload(&cmd, settings)?;
            let report = contend(options, &workload)?;
            emit(cli.format, &report, || print_contend_text(&report))?;
            if report.violations > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Config => {
            let contend = ContendSection {
                threads: Some(settings.threads.unwrap_or(DEFAULT_THREADS)),
                pages: Some(settings.pages.unwrap_or(DEFAULT_PAGES)),
                requests: Some(settings.requests.unwrap_or(DEFAULT_REQUESTS)),
                hold_ms: Some(settings.hold_ms.unwrap_or(DEFAULT_HOLD_MS)),
                seed: Some(settings.seed.unwrap_or(DEFAULT_SEED)),
            };
            let rendered = config::render(
                options.timeout.as_millis() as u64,
                options.thread_dump.into(),
                &contend,
            )?;
            if let Some(path) = config.path() {
                println!("# config file: {}", path.display());
            }
            print!("{rendered}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn lock_options(args: &LockArgs, settings: &Settings) -> LockOptions {
    let defaults = LockOptions::default();
    LockOptions {
        timeout: args
            .timeout_ms
            .or(settings.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout),
        thread_dump: args
            .thread_dump
            .or(settings.thread_dump)
            .map(ThreadDumpStrategy::from)
            .unwrap_or(defaults.thread_dump),
    }
}

fn build_workload(cmd: &ContendCmd, settings: &Settings) -> Result<Workload, Box<dyn Error>> {
    let workload = Workload {
        threads: cmd.threads.or(settings.threads).unwrap_or(DEFAULT_THREADS),
        pages: cmd.pages.or(settings.pages).unwrap_or(DEFAULT_PAGES),
        requests: cmd.requests.or(settings.requests).unwrap_or(DEFAULT_REQUESTS),
        hold: Duration::from_millis(cmd.hold_ms.or(settings.hold_ms).unwrap_or(DEFAULT_HOLD_MS)),
        seed: cmd.seed.or(settings.seed).unwrap_or(DEFAULT_SEED),
    };
    if workload.threads == 0 {
        return Err(PageSyncError::InvalidArgument("threads must be at least 1".into()).into());
    }
    if workload.pages == 0 || workload.pages > MAX_PAGES {
        let msg = format!("pages must be between 1 and {MAX_PAGES}");
        return Err(PageSyncError::InvalidArgument(msg).into());
    }
    Ok(workload)
}

fn contend(options: LockOptions, workload: &Workload) -> Result<ContendReport, Box<dyn Error>> {
    let locks = Arc::new(PageLockManager::new(options));
    let manager = MemoryPageManager::default();
    for page in 0..workload.pages {
        manager
            .page_store()
            .insert(MemoryPage::new(PageId(page), 0u64.to_le_bytes().to_vec()));
    }
    let pages = Arc::new(locks.wrap(manager));
    let occupancy: Arc<Vec<AtomicUsize>> =
        Arc::new((0..workload.pages).map(|_| AtomicUsize::new(0)).collect());

    info!(
        threads = workload.threads,
        pages = workload.pages,
        requests = workload.requests,
        timeout_ms = options.timeout.as_millis() as u64,
        "contend.start"
    );
    let start = Instant::now();
    let mut handles = Vec::with_capacity(workload.threads);
    for worker in 0..workload.threads {
        let pages = Arc::clone(&pages);
        let occupancy = Arc::clone(&occupancy);
        let workload = workload.clone();
        let handle = thread::Builder::new()
            .name(format!("contend-{worker}"))
            .spawn(move || run_worker(worker, &pages, &occupancy, &workload))?;
        handles.push(handle);
    }

    let mut report = ContendReport {
        threads: workload.threads,
        pages: workload.pages,
        requests: workload.threads.saturating_mul(workload.requests),
        timeout_ms: options.timeout.as_millis() as u64,
        ..ContendReport::default()
    };
    for handle in handles {
        let stats = handle
            .join()
            .map_err(|_| PageSyncError::InvalidArgument("worker thread panicked".into()))??;
        report.acquired += stats.acquired;
        report.misses += stats.misses;
        report.timeouts += stats.timeouts;
        report.violations += stats.violations;
        report.max_wait_ms = report.max_wait_ms.max(stats.max_wait.as_millis() as u64);
    }
    report.elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        acquired = report.acquired,
        timeouts = report.timeouts,
        violations = report.violations,
        "contend.done"
    );
    Ok(report)
}

fn run_worker(
    worker: usize,
    pages: &SynchronizedPageManager<MemoryPageManager>,
    occupancy: &[AtomicUsize],
    workload: &Workload,
) -> Result<WorkerStats, PageSyncError> {
    let mut rng = StdRng::seed_from_u64(workload.seed.wrapping_add(worker as u64));
    let mut stats = WorkerStats::default();
    for _ in 0..workload.requests {
        let page_id = PageId(rng.gen_range(0..workload.pages));
        let requested = Instant::now();
        match pages.get_page(page_id) {
            Ok(Some(page)) => {
                stats.max_wait = stats.max_wait.max(requested.elapsed());
                stats.acquired += 1;
                let slot = &occupancy[page_id.0 as usize];
                if slot.fetch_add(1, Ordering::SeqCst) != 0 {
                    stats.violations += 1;
                }
                let counter = read_counter(page.data()).wrapping_add(1);
                pages.touch_page(&page.with_data(counter.to_le_bytes().to_vec()))?;
                if !workload.hold.is_zero() {
                    thread::sleep(workload.hold);
                }
                slot.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(None) => stats.misses += 1,
            Err(err) if err.is_timeout() => stats.timeouts += 1,
            Err(err) => return Err(err),
        }
        pages.detach()?;
    }
    Ok(stats)
}

fn read_counter(data: &[u8]) -> u64 {
    data.get(..8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_contend_text(report: &ContendReport) {
    println!("Contention:");
    println!(
        "  threads={} pages={} requests={} timeout_ms={}",
        report.threads, report.pages, report.requests, report.timeout_ms
    );
    println!(
        "  acquired={} misses={} timeouts={} max_wait_ms={} elapsed_ms={}",
        report.acquired, report.misses, report.timeouts, report.max_wait_ms, report.elapsed_ms
    );
    println!("  violations={}", report.violations);
}
