use clap::Parser;
use log::{info, warn};
use matepair::config::EngineConfig;
use matepair::fragment::MachineOrientation;
use matepair::pipeline::{group_by_reference, pair_references, PairingOptions, RunSummary};
use matepair::tsv::{read_hits_file, write_hit_statuses, write_pairs};
use rayon::ThreadPoolBuilder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = default_threads())]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Pair read-end alignment hits into mated fragments.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Pair the hits of a tab-separated hit table
    Pair {
        #[clap(flatten)]
        common: CommonOpts,

        /// Hit table (plain or BGZF-compressed); `-` reads standard input
        #[clap(short = 'i', long, value_parser)]
        input: String,

        /// Output file for mated pairs (standard output if omitted)
        #[clap(short = 'o', long, value_parser)]
        output: Option<String>,

        /// Minimum fragment length
        #[clap(long, value_parser, default_value_t = 0)]
        min_fragment: i64,

        /// Maximum fragment length
        #[clap(short = 'f', long, value_parser, default_value_t = 1000)]
        max_fragment: i64,

        /// Expected maximum read length (raised to the longest read in the input)
        #[clap(short = 'l', long, value_parser, default_value_t = 150)]
        read_length: i64,

        /// Extra positions of out-of-order arrival tolerated
        #[clap(long, value_parser, default_value_t = 64)]
        uncertainty_margin: i64,

        /// Library orientation: fr, rf, ff or any
        #[clap(long, value_parser, default_value = "fr")]
        orientation: String,

        /// Minimum alignment score for both ends of a pair
        #[clap(short = 's', long, value_parser, default_value_t = 0)]
        min_score: i32,

        /// Maximum hits buffered at one position before the position is dropped
        #[clap(long, value_parser)]
        max_hits_per_position: Option<usize>,

        /// Maximum hits of one read end, or mates of one hit, before it is skipped
        #[clap(long, value_parser)]
        max_hits_per_read: Option<usize>,

        /// Treat the second arm as the left end when both ends start at the same position
        #[clap(long, action)]
        tie_second_arm: bool,

        /// Report every geometric pair, ignoring scores
        #[clap(short = 'u', long, action)]
        unfiltered: bool,

        /// Write the mate count of every buffered hit to this file (unfiltered mode only)
        #[clap(long, value_parser, requires = "unfiltered")]
        hit_status: Option<String>,

        /// Check window and index consistency after every advance (slow, useful for debugging)
        #[clap(long, action)]
        paranoid: bool,

        /// Write run diagnostics as JSON to this file
        #[clap(long, value_parser)]
        stats_json: Option<String>,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Pair {
            common,
            input,
            output,
            min_fragment,
            max_fragment,
            read_length,
            uncertainty_margin,
            orientation,
            min_score,
            max_hits_per_position,
            max_hits_per_read,
            tie_second_arm,
            unfiltered,
            hit_status,
            paranoid,
            stats_json,
        } => {
            initialize(&common)?;

            let orientation = MachineOrientation::from_name(&orientation).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Unknown orientation '{}' (expected fr, rf, ff or any)",
                        orientation
                    ),
                )
            })?;

            let mut config = EngineConfig::new(min_fragment, max_fragment, read_length);
            config.uncertainty_margin = uncertainty_margin;
            config.max_hits_per_position = max_hits_per_position;
            config.max_hits_per_read = max_hits_per_read;
            config.tie_left_arm = tie_second_arm;
            config.paranoid = paranoid;

            let hits = read_hits_file(&input)?;
            info!("Read {} hits from {}", hits.len(), input);
            config.validate()?;

            let options = PairingOptions {
                config,
                orientation,
                min_score,
                unfiltered,
            };
            let results = pair_references(group_by_reference(hits), &options)?;

            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            for result in &results {
                write_pairs(&mut out, &result.reference, &result.pairs)?;
            }
            out.flush()?;

            if let Some(path) = &hit_status {
                let mut out = BufWriter::new(File::create(path)?);
                let mut written = 0;
                for result in &results {
                    write_hit_statuses(&mut out, &result.reference, &result.statuses)?;
                    written += result.statuses.len();
                }
                out.flush()?;
                info!("Wrote {} hit statuses to {}", written, path);
            }

            let summary = RunSummary::from_results(&results);
            let total = &summary.total;
            info!(
                "{} hits, {} duplicates, {} pairs over {} sequences",
                total.total_hits, total.duplicate_hits, total.total_pairs, total.sequences_seen
            );
            if total.max_pos_hits_exceeded > 0 {
                warn!(
                    "{} positions exceeded {} hits and were dropped",
                    total.max_pos_hits_exceeded, total.max_pos_hits_threshold
                );
            }
            if total.left_overload_count + total.right_overload_count > 0 {
                warn!(
                    "{} hits skipped as overloaded, {} mate scans cut short",
                    total.left_overload_count, total.right_overload_count
                );
            }

            if let Some(path) = stats_json {
                let writer = BufWriter::new(File::create(&path)?);
                serde_json::to_writer_pretty(writer, &summary).map_err(|e| {
                    io::Error::other(format!("Failed to write statistics to {}: {}", path, e))
                })?;
                info!("Wrote diagnostics to {}", path);
            }
        }
    }

    Ok(())
}

/// Initialize logging and the global thread pool
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {}", e)))
}
