use clap::{Parser, Subcommand};
use log::warn;
use qrsdp::manifest::{iter_days, Manifest};
use qrsdp::replay::replay_file;
use qrsdp::stream::{iter_chunks, read_header};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qrsdp", version, about = "Inspect and replay .qrsdp event logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a session file's header
    Info {
        input: PathBuf,
    },
    /// List the chunk headers of a session file
    Chunks {
        input: PathBuf,
    },
    /// Print the first events of a session
    Dump {
        input: PathBuf,
        /// Maximum events to print
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Replay a session into a top-of-book time series
    Replay {
        input: PathBuf,
        /// Write the series as CSV here instead of printing a summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the sessions of a run directory with record counts
    Sessions {
        run_dir: PathBuf,
        /// Inclusive first date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Inclusive last date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Restrict to one security symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let h = read_header(&input)?;
            println!("Session: {}", input.display());
            println!("  format version:  {}.{}", h.version_major, h.version_minor);
            println!("  seed:            {}", h.seed);
            println!("  p0_ticks:        {}", h.p0_ticks);
            println!("  tick_size:       {}", h.tick_size);
            println!("  session_seconds: {}", h.session_seconds);
            println!("  levels_per_side: {}", h.levels_per_side);
            println!("  initial_spread:  {} ticks", h.initial_spread_ticks);
            println!("  initial_depth:   {} lots", h.initial_depth);
            println!("  chunk_capacity:  {} records", h.chunk_capacity);
            println!("  header_flags:    {:#010x}", h.header_flags);
            match h.market_open() {
                Some(ns) => println!("  market_open:     {}", format_day_offset(ns)),
                None => println!("  market_open:     (reserved in v1.0)"),
            }
        }

        // ── Chunks ───────────────────────────────────────────────────────────
        Commands::Chunks { input } => {
            println!("{:>5} {:>9} {:>12} {:>12} {:>16} {:>16}",
                     "chunk", "records", "packed B", "on-disk B", "first_ts", "last_ts");
            let mut total = 0u64;
            for (i, chunk) in iter_chunks(&input)?.enumerate() {
                let c = chunk?;
                total += c.header.record_count as u64;
                println!("{:>5} {:>9} {:>12} {:>12} {:>16} {:>16}",
                         i, c.header.record_count, c.header.uncompressed_size,
                         c.header.compressed_size, c.header.first_ts, c.header.last_ts);
            }
            println!("total: {total} records");
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, limit } => {
            println!("{:>16} {:<13} {:>4} {:>10} {:>8} {:>18}",
                     "ts_ns", "type", "side", "price", "qty", "order_id");
            let mut printed = 0usize;
            'outer: for chunk in iter_chunks(&input)? {
                for r in chunk?.records {
                    let name = r.event_type().map(|t| t.name()).unwrap_or("?");
                    println!("{:>16} {:<13} {:>4} {:>10} {:>8} {:>18}",
                             r.ts_ns, name, r.side, r.price_ticks, r.qty, r.order_id);
                    printed += 1;
                    if printed >= limit {
                        break 'outer;
                    }
                }
            }
        }

        // ── Replay ───────────────────────────────────────────────────────────
        Commands::Replay { input, output } => {
            let series = replay_file(&input)?;
            match output {
                Some(path) => {
                    let mut w = std::io::BufWriter::new(std::fs::File::create(&path)?);
                    writeln!(w, "ts_ns,best_bid,best_ask,mid_ticks,spread_ticks")?;
                    for i in 0..series.len() {
                        writeln!(w, "{},{},{},{},{}",
                                 series.ts_ns[i], series.best_bid[i], series.best_ask[i],
                                 series.mid_ticks[i], series.spread_ticks[i])?;
                    }
                    println!("Wrote {} samples to {}", series.len(), path.display());
                }
                None => {
                    println!("Replayed {} events from {}", series.len(), input.display());
                    if let (Some(first), Some(last)) =
                        (series.mid_ticks.first(), series.mid_ticks.last())
                    {
                        println!("  mid:    {first} -> {last}");
                        let max_spread = series.spread_ticks.iter().max().unwrap();
                        println!("  spread: max {max_spread} ticks");
                    }
                }
            }
        }

        // ── Sessions ─────────────────────────────────────────────────────────
        Commands::Sessions { run_dir, start, end, symbol } => {
            for d in [&start, &end].into_iter().flatten() {
                validate_date(d)?;
            }
            let manifest = Manifest::load_dir(&run_dir)?;
            let symbols = manifest.symbols();
            if !symbols.is_empty() {
                println!("Securities: {}", symbols.join(", "));
            }

            println!("{:<8} {:<12} {:>10}", "symbol", "date", "records");
            let days = iter_days(&run_dir, start.as_deref(), end.as_deref(), symbol.as_deref())?;
            for day in days {
                // One bad day must not sink the rest of the run.
                match day {
                    Ok(s) => println!("{:<8} {:<12} {:>10}", s.symbol, s.date, s.records.len()),
                    Err(e) => warn!("skipping session: {e}"),
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Render a nanoseconds-since-midnight offset as a wall-clock time.
fn format_day_offset(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) % 86_400;
    match chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, 0) {
        Some(t) => format!("{t} ({ns} ns)"),
        None => format!("{ns} ns"),
    }
}

fn validate_date(s: &str) -> Result<(), Box<dyn std::error::Error>> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("invalid date {s:?} (expected YYYY-MM-DD): {e}"))?;
    Ok(())
}
