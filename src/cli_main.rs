use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "prgmap",
    version,
    about = "Pangenome-aware read-to-graph mapper and genotyper",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sketch a PRG file into per-locus k-mer graphs and a minimizer index
    Index {
        /// PRG FASTA file
        prg_file: String,

        /// Window size for (w,k)-minimizers
        #[arg(short, default_value_t = 1)]
        w: u32,

        /// K-mer size for (w,k)-minimizers
        #[arg(short, default_value_t = 15)]
        k: u32,

        /// Directory receiving kmer_prgs/
        #[arg(short, long, default_value = ".")]
        outdir: String,

        /// Number of threads
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },

    /// Map reads against the PRGs and call a sequence per covered locus
    Map {
        /// PRG FASTA file
        prg_file: String,

        /// Reads FASTA/FASTQ(.gz)
        reads_file: String,

        /// Window size for (w,k)-minimizers
        #[arg(short, default_value_t = 1)]
        w: u32,

        /// K-mer size for (w,k)-minimizers
        #[arg(short, default_value_t = 15)]
        k: u32,

        /// Output prefix
        #[arg(short, long, default_value = "prgmap")]
        output: String,

        /// Previously built minimizer index (defaults to the sibling of the
        /// PRG file when present)
        #[arg(long)]
        index: Option<String>,

        /// Maximum gap between hits of one cluster, in read bases
        #[arg(long, default_value_t = 500)]
        max_diff: u32,

        /// Minimum hits per cluster
        #[arg(long, default_value_t = 4)]
        cluster_thresh: usize,

        /// Coverage emission model: nbin, bin or lin
        #[arg(long, default_value = "bin")]
        model: String,

        /// Expected per-base sequencing error rate
        #[arg(long, default_value_t = 0.11)]
        e_rate: f32,

        /// Sliding window length for path score averaging
        #[arg(long, default_value_t = 100)]
        max_kmers_to_average: u32,

        /// Resolve forks by re-aligning reads with minimap2
        #[arg(long)]
        rescue: bool,

        /// Number of threads
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },

    /// Map several samples and report per-locus scores per sample
    Compare {
        /// PRG FASTA file
        prg_file: String,

        /// Sample sheet: one "name<TAB>reads-path" per line
        sample_sheet: String,

        /// Window size for (w,k)-minimizers
        #[arg(short, default_value_t = 1)]
        w: u32,

        /// K-mer size for (w,k)-minimizers
        #[arg(short, default_value_t = 15)]
        k: u32,

        /// Output prefix
        #[arg(short, long, default_value = "prgmap")]
        output: String,

        /// Maximum gap between hits of one cluster, in read bases
        #[arg(long, default_value_t = 500)]
        max_diff: u32,

        /// Minimum hits per cluster
        #[arg(long, default_value_t = 4)]
        cluster_thresh: usize,

        /// Coverage emission model: nbin, bin or lin
        #[arg(long, default_value = "bin")]
        model: String,

        /// Expected per-base sequencing error rate
        #[arg(long, default_value_t = 0.11)]
        e_rate: f32,

        /// Sliding window length for path score averaging
        #[arg(long, default_value_t = 100)]
        max_kmers_to_average: u32,

        /// Number of threads
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },

    /// Map, call, and locally assemble weakly supported loci de novo
    Discover {
        /// PRG FASTA file
        prg_file: String,

        /// Reads FASTA/FASTQ(.gz)
        reads_file: String,

        /// Window size for (w,k)-minimizers
        #[arg(short, default_value_t = 1)]
        w: u32,

        /// K-mer size for (w,k)-minimizers
        #[arg(short, default_value_t = 15)]
        k: u32,

        /// Output prefix
        #[arg(short, long, default_value = "prgmap")]
        output: String,

        /// Maximum gap between hits of one cluster, in read bases
        #[arg(long, default_value_t = 500)]
        max_diff: u32,

        /// Minimum hits per cluster
        #[arg(long, default_value_t = 4)]
        cluster_thresh: usize,

        /// Coverage emission model: nbin, bin or lin
        #[arg(long, default_value = "bin")]
        model: String,

        /// Expected per-base sequencing error rate
        #[arg(long, default_value_t = 0.11)]
        e_rate: f32,

        /// Sliding window length for path score averaging
        #[arg(long, default_value_t = 100)]
        max_kmers_to_average: u32,

        /// K-mer size for the de novo de Bruijn graph
        #[arg(long, default_value_t = 11)]
        denovo_kmer_size: usize,

        /// Maximum assembled path length in bases
        #[arg(long, default_value_t = 250)]
        max_path_length: usize,

        /// Clip short tips from the de Bruijn graph before assembly
        #[arg(long)]
        clean: bool,

        /// Minimum k-mer abundance kept in the de Bruijn graph
        #[arg(long, default_value_t = 2)]
        min_dbg_coverage: u32,

        /// Candidate anchors drawn from each consensus flank
        #[arg(long, default_value_t = 5)]
        num_anchor_kmers: usize,

        /// Number of threads
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,
    },
}
