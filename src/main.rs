use clap::Parser;
use log::info;
use rayon::ThreadPoolBuilder;
use samflat::commands::consensus::{run_consensus, ConsensusConfig};
use samflat::commands::indels::{run_indels, IndelConfig};
use samflat::consensus::Normalization;
use std::io;
use std::num::NonZeroUsize;

fn default_threads() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Path to the SAM/BAM file, sorted or grouped by query name. Use `-` for stdin.
    #[clap(short = 's', long, value_parser)]
    sam: String,

    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = default_threads())]
    threads: NonZeroUsize,

    /// Verbosity level (0 = warn, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Reconstruct reads in reference coordinates and catalogue their indels.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Write one reference-length sequence per query, flattening multi-mapped queries
    Consensus {
        #[clap(flatten)]
        common: CommonOpts,

        /// Output FASTA file (`-` for stdout, `.gz`/`.bgz` for BGZF)
        #[clap(short = 'o', long, value_parser, default_value = "-")]
        output: String,

        /// Reference length to use instead of the lengths in the SAM header
        #[clap(short = 'l', long, value_parser)]
        reference_length: Option<usize>,

        /// Fill uncovered flanks with '-' and internal gaps with 'N' (default: all 'N')
        #[clap(long, action)]
        pad: bool,
    },
    /// Tally insertions and deletions across all mapped reads
    Indels {
        #[clap(flatten)]
        common: CommonOpts,

        /// Output TSV for insertions
        #[clap(long, value_parser)]
        insertions_out: String,

        /// Output TSV for deletions
        #[clap(long, value_parser)]
        deletions_out: String,

        /// Only report sites supported by at least this many reads
        #[clap(long, value_parser, default_value_t = 1)]
        threshold: usize,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Consensus {
            common,
            output,
            reference_length,
            pad,
        } => {
            initialize(&common)?;
            let config = ConsensusConfig {
                reference_length,
                normalization: Some(if pad {
                    Normalization::Boundary
                } else {
                    Normalization::Unknown
                }),
                ..ConsensusConfig::default()
            };
            run_consensus(&common.sam, &output, &config)?;
        }
        Args::Indels {
            common,
            insertions_out,
            deletions_out,
            threshold,
        } => {
            initialize(&common)?;
            let config = IndelConfig {
                threads: common.threads,
                threshold,
            };
            run_indels(&common.sam, &insertions_out, &deletions_out, &config)?;
        }
    }

    Ok(())
}

/// Initialize logging and the thread pool based on common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(log_level(common.verbose))
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.threads.into())
        .build_global()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {}", e)))?;

    info!("Using {} threads", common.threads);
    Ok(())
}

/// Skipped-read warnings stay visible without `-v`
fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level() {
        assert_eq!(log_level(0), log::LevelFilter::Warn);
        assert_eq!(log_level(1), log::LevelFilter::Info);
        assert_eq!(log_level(2), log::LevelFilter::Debug);
        assert_eq!(log_level(9), log::LevelFilter::Debug);
    }
}
