mod cli_main;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use rayon::ThreadPoolBuilder;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

use cli_main::{Cli, Commands};
use prgmap::pipeline::{self, DiscoverParams, MapParams};
use prgmap::prg::ProbModel;
use prgmap::PrgMapError;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("could not install the tracing subscriber");
        return ExitCode::from(2);
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Usage and I/O problems exit 1; unrecoverable runtime errors exit 2.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<PrgMapError>() {
        Some(PrgMapError::Io { .. })
        | Some(PrgMapError::MalformedInput(_))
        | Some(PrgMapError::MismatchedIndexParams { .. })
        | Some(PrgMapError::InvalidParameters(_))
        | Some(PrgMapError::UnknownProbModel(_)) => 1,
        _ => 2,
    }
}

fn init_thread_pool(threads: usize) -> anyhow::Result<()> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("could not size the thread pool: {}", e))
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Index {
            prg_file,
            w,
            k,
            outdir,
            threads,
        } => {
            init_thread_pool(threads)?;
            pipeline::run_index(Path::new(&prg_file), w, k, Path::new(&outdir))
        }

        Commands::Map {
            prg_file,
            reads_file,
            w,
            k,
            output,
            index,
            max_diff,
            cluster_thresh,
            model,
            e_rate,
            max_kmers_to_average,
            rescue,
            threads,
        } => {
            init_thread_pool(threads)?;
            let params = MapParams {
                w,
                k,
                max_diff,
                cluster_thresh,
                model: model.parse::<ProbModel>()?,
                e_rate,
                max_kmers_to_average,
                rescue,
            };
            pipeline::run_map(
                Path::new(&prg_file),
                Path::new(&reads_file),
                &output,
                &params,
                index.as_deref().map(Path::new),
            )
        }

        Commands::Compare {
            prg_file,
            sample_sheet,
            w,
            k,
            output,
            max_diff,
            cluster_thresh,
            model,
            e_rate,
            max_kmers_to_average,
            threads,
        } => {
            init_thread_pool(threads)?;
            let params = MapParams {
                w,
                k,
                max_diff,
                cluster_thresh,
                model: model.parse::<ProbModel>()?,
                e_rate,
                max_kmers_to_average,
                rescue: false,
            };
            pipeline::run_compare(
                Path::new(&prg_file),
                Path::new(&sample_sheet),
                &output,
                &params,
            )
        }

        Commands::Discover {
            prg_file,
            reads_file,
            w,
            k,
            output,
            max_diff,
            cluster_thresh,
            model,
            e_rate,
            max_kmers_to_average,
            denovo_kmer_size,
            max_path_length,
            clean,
            min_dbg_coverage,
            num_anchor_kmers,
            threads,
        } => {
            init_thread_pool(threads)?;
            let params = MapParams {
                w,
                k,
                max_diff,
                cluster_thresh,
                model: model.parse::<ProbModel>()?,
                e_rate,
                max_kmers_to_average,
                rescue: false,
            };
            let discover = DiscoverParams {
                denovo_kmer_size,
                max_path_length,
                clean_graph: clean,
                min_dbg_coverage,
                num_anchor_kmers,
            };
            pipeline::run_discover(
                Path::new(&prg_file),
                Path::new(&reads_file),
                &output,
                &params,
                &discover,
            )
        }
    }
}
