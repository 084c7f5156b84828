//! canlog command-line tool

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use canlog_core::config::LoggerConfig;
use canlog_core::datalog::{self, BinaryLogReader, CanLogger, LogFormat};
use canlog_core::decode::{builtin_catalog, Catalog, DecodedValue, Provenance, SignalStore};
use canlog_core::demo::DemoBus;
use canlog_core::frame::TimestampedFrame;
use canlog_core::session::{DirectoryStorage, MonotonicClock, SystemClock, TimeSource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log simulated bus traffic through the full pipeline
    Record {
        /// Directory receiving the log files
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Logger configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured format
        #[arg(long, value_parser = parse_format)]
        format: Option<LogFormat>,
        /// How long to record
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Start a new file every N seconds
        #[arg(long)]
        rotate_secs: Option<u64>,
        /// Seconds between statistics lines
        #[arg(long, default_value_t = 1)]
        stats_secs: u64,
        /// Seed for reproducible traffic
        #[arg(long)]
        seed: Option<u64>,
        /// Pretend there is no calendar clock (sequence-numbered files)
        #[arg(long)]
        no_wall_clock: bool,
    },
    /// Convert a binary log to CSV
    Convert {
        input: PathBuf,
        /// Destination; defaults to the input with a .csv extension
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summarize a binary log
    Info {
        input: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a binary log with the signal catalog
    Decode {
        input: PathBuf,
        /// Catalog file (JSON) to use instead of the built-in one
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Print every update instead of the final values
        #[arg(long)]
        follow: bool,
        /// Skip signals whose formula is unverified
        #[arg(long)]
        verified_only: bool,
        /// Show speeds, temperatures, pressures and distances in imperial units
        #[arg(long)]
        imperial: bool,
    },
}

fn parse_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "bin" | "binary" => Ok(LogFormat::Binary),
        "csv" => Ok(LogFormat::Csv),
        other => Err(format!("unknown format '{other}', expected bin or csv")),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Record {
            dir,
            config,
            format,
            seconds,
            rotate_secs,
            stats_secs,
            seed,
            no_wall_clock,
        } => {
            let mut config = match config {
                Some(path) => LoggerConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => LoggerConfig::default(),
            };
            if let Some(format) = format {
                config.format = format;
                config.write_buffer_bytes = None;
            }
            let clock: Arc<dyn TimeSource> = if no_wall_clock {
                Arc::new(MonotonicClock::new())
            } else {
                Arc::new(SystemClock::new())
            };
            record(
                &dir,
                config,
                clock,
                RecordOptions {
                    duration: Duration::from_secs(seconds),
                    rotate: rotate_secs.map(Duration::from_secs),
                    stats_every: Duration::from_secs(stats_secs.max(1)),
                    seed,
                },
            )
        }
        Command::Convert { input, output } => {
            let output = output.unwrap_or_else(|| input.with_extension("csv"));
            let count = datalog::convert_file(&input, &output)
                .with_context(|| format!("converting {}", input.display()))?;
            info!(records = count, output = %output.display(), "converted");
            Ok(())
        }
        Command::Info { input, json } => {
            let reader = BinaryLogReader::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let summary = datalog::summarize(reader)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            println!("file:      {}", input.display());
            match summary.session.local_datetime(summary.session.monotonic_us) {
                Some(dt) => println!("started:   {}", dt.format("%Y-%m-%d %H:%M:%S")),
                None => println!("started:   (no wall clock)"),
            }
            println!("records:   {}", summary.record_count);
            println!(
                "duration:  {:.3} s",
                summary.duration_us() as f64 / 1_000_000.0
            );
            if summary.trailing_bytes > 0 {
                println!("truncated: {} trailing bytes", summary.trailing_bytes);
            }
            for (id, count) in &summary.per_id {
                println!("  {:03X}  {}", id, count);
            }
            Ok(())
        }
        Command::Decode {
            input,
            catalog,
            follow,
            verified_only,
            imperial,
        } => {
            let catalog = match catalog {
                Some(path) => Catalog::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => builtin_catalog(),
            };
            decode(
                &input,
                &catalog,
                DecodeOptions {
                    follow,
                    verified_only,
                    imperial,
                },
            )
        }
    }
}

struct RecordOptions {
    duration: Duration,
    rotate: Option<Duration>,
    stats_every: Duration,
    seed: Option<u64>,
}

fn record(
    dir: &Path,
    config: LoggerConfig,
    clock: Arc<dyn TimeSource>,
    opts: RecordOptions,
) -> anyhow::Result<()> {
    config.validate()?;
    let storage = Arc::new(
        DirectoryStorage::create_dir_all(dir)
            .with_context(|| format!("preparing {}", dir.display()))?,
    );
    let autostart = config.autostart;
    let ring_bytes = config.ring_buffer_bytes;
    let logger = CanLogger::new(config, storage, Arc::clone(&clock));
    logger.init(ring_bytes)?;

    if !autostart {
        println!("autostart is off; press Enter to start logging");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
    }
    logger.start()?;

    let mut bus = match opts.seed {
        Some(seed) => DemoBus::with_seed(seed),
        None => DemoBus::new(),
    };
    let began = Instant::now();
    let mut last_stats = Instant::now();
    let mut last_rotate = Instant::now();

    while began.elapsed() < opts.duration {
        let elapsed_ms = began.elapsed().as_millis() as u64;
        for frame in bus.update(elapsed_ms) {
            // Drops are counted in the stats.
            let _ = logger.log_frame(&frame);
        }

        if let Some(every) = opts.rotate {
            if last_rotate.elapsed() >= every {
                logger.restart()?;
                last_rotate = Instant::now();
            }
        }

        if last_stats.elapsed() >= opts.stats_every {
            let stats = logger.get_stats();
            info!(
                state = ?stats.state,
                file = stats.current_file.as_deref().unwrap_or("-"),
                logged = stats.messages_logged,
                dropped = stats.messages_dropped,
                errors = stats.write_errors,
                bytes = stats.bytes_written,
                "stats"
            );
            last_stats = Instant::now();
        }

        if !logger.is_running() {
            bail!("logger left the running state: {:?}", logger.get_stats());
        }
        thread::sleep(Duration::from_millis(5));
    }

    logger.stop()?;
    let stats = logger.get_stats();
    if stats.messages_dropped > 0 {
        warn!(dropped = stats.messages_dropped, "frames were dropped");
    }
    println!(
        "{}: {} messages, {} bytes",
        stats.current_file.as_deref().unwrap_or("-"),
        stats.messages_logged,
        stats.bytes_written
    );
    Ok(())
}

struct DecodeOptions {
    follow: bool,
    verified_only: bool,
    imperial: bool,
}

fn format_value(name: &str, value: &DecodedValue, imperial: bool) -> String {
    let shown = if imperial { value.to_imperial() } else { *value };
    let marker = match shown.provenance {
        Provenance::Verified => "",
        Provenance::Unverified => " (unverified)",
    };
    format!("{:<28} {:>12.3} {}{}", name, shown.value, shown.unit.label(), marker)
}

fn decode(input: &Path, catalog: &Catalog, opts: DecodeOptions) -> anyhow::Result<()> {
    let reader =
        BinaryLogReader::open(input).with_context(|| format!("opening {}", input.display()))?;
    let mut store = SignalStore::new(catalog);
    let wanted = |provenance: Provenance| !opts.verified_only || provenance == Provenance::Verified;

    for record in reader {
        let record = record?;
        let ts = i64::try_from(record.timestamp_us).unwrap_or(i64::MAX);
        let entry = TimestampedFrame::new(ts, record.frame());
        store.apply(catalog, &entry);
        if opts.follow {
            for signal in catalog.decode(&entry.frame) {
                let Some(value) = store.get(&signal.def.name) else {
                    continue;
                };
                if wanted(value.provenance) {
                    let value = DecodedValue {
                        value: signal.value,
                        ..*value
                    };
                    println!(
                        "{:>12} {}",
                        record.timestamp_us,
                        format_value(&signal.def.name, &value, opts.imperial)
                    );
                }
            }
        }
    }

    if !opts.follow {
        for (name, value) in store.valid_values() {
            if wanted(value.provenance) {
                println!("{}", format_value(name, value, opts.imperial));
            }
        }
    }
    Ok(())
}
