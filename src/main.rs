use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use noodles::bam;
use noodles::sam;

use ampliclip::io::bed::BedReader;
use ampliclip::io::report::{write_amplicon_depths, ReportWriter};
use ampliclip::scheme::{PrimerScheme, SchemeError};
use ampliclip::trim::normalize::NormalizationState;
use ampliclip::trim::{trim_alignments, TrimOpt, TrimStats};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "ampliclip",
    author,
    version,
    about = "Trim amplicon primers from aligned reads and normalise per-amplicon depth",
    arg_required_else_help = true
)]
struct Cli {
    /// Input BAM file with aligned amplicon reads
    bamfile: PathBuf,

    /// Primer scheme BED file (chrom, start, end, name, pool[, strand])
    #[arg(short = 'b', long = "scheme")]
    scheme: PathBuf,

    /// Output path; format chosen by extension (.bam binary, anything else SAM).
    /// SAM on stdout if omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Cap each amplicon/orientation group at this many reads
    #[arg(short = 'n', long = "normalise")]
    normalise: Option<u32>,

    /// Bases of slop allowed when matching read boundaries to primers
    #[arg(long = "match-tolerance", default_value_t = 35)]
    match_tolerance: usize,

    /// Discard records below this mapping quality before matching
    #[arg(long = "min-mapq", default_value_t = 20)]
    min_mapq: u8,

    /// Per-read report TSV
    #[arg(long)]
    report: Option<PathBuf>,

    /// Per-amplicon mean depth TSV
    #[arg(long = "amp-depth-report")]
    amp_depth_report: Option<PathBuf>,

    /// Annotate and normalise without rewriting CIGARs
    #[arg(long = "no-trim-primers")]
    no_trim_primers: bool,

    /// Discard reads with a boundary outside the match tolerance
    #[arg(long = "discard-unmatched")]
    discard_unmatched: bool,

    /// Require reads to span their amplicon insert end to end
    #[arg(long = "require-full-length")]
    require_full_length: bool,

    /// Skip read-group tagging of output records
    #[arg(long = "no-read-groups")]
    no_read_groups: bool,

    #[arg(short = 't', long = "threads", default_value_t = 1)]
    threads: usize,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        // scheme inconsistencies get their own exit code, per-record problems never get here
        let code = if err.chain().any(|cause| cause.is::<SchemeError>()) {
            2
        } else {
            1
        };
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let scheme = load_scheme(&cli.scheme)?;
    info!(
        "loaded {} primers across {} amplicons from {}",
        scheme.primers().len(),
        scheme.amplicons().count(),
        cli.scheme.display()
    );

    let opt = TrimOpt {
        match_tolerance: cli.match_tolerance,
        min_mapping_quality: cli.min_mapq,
        max_amplicon_depth: cli.normalise,
        trim_primers: !cli.no_trim_primers,
        discard_unmatched: cli.discard_unmatched,
        require_full_length: cli.require_full_length,
        read_groups: !cli.no_read_groups,
        threads: cli.threads,
        invocation: std::env::args().collect::<Vec<_>>().join(" "),
    };

    let bam = File::open(&cli.bamfile)
        .with_context(|| format!("cannot open BAM file '{}'", cli.bamfile.display()))?;
    let mut reader = bam::io::Reader::new(bam);

    let report = cli
        .report
        .as_ref()
        .map(ReportWriter::create)
        .transpose()?;

    let mut state = NormalizationState::new();

    let stats = match &cli.output {
        Some(path) if path.extension().is_some_and(|ext| ext == "bam") => {
            let out = File::create(path)
                .with_context(|| format!("cannot create output file '{}'", path.display()))?;
            let mut writer = bam::io::Writer::new(BufWriter::new(out));
            trim_alignments(&scheme, &opt, &mut reader, &mut writer, report, &mut state)?
        }
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("cannot create output file '{}'", path.display()))?;
            let mut writer = sam::io::Writer::new(BufWriter::new(out));
            trim_alignments(&scheme, &opt, &mut reader, &mut writer, report, &mut state)?
        }
        None => {
            let mut writer = sam::io::Writer::new(BufWriter::new(std::io::stdout().lock()));
            trim_alignments(&scheme, &opt, &mut reader, &mut writer, report, &mut state)?
        }
    };

    if let Some(path) = &cli.amp_depth_report {
        write_depth_report(path, &scheme, &stats)?;
    }

    Ok(())
}

fn load_scheme(path: &Path) -> Result<PrimerScheme> {
    let file = File::open(path)
        .with_context(|| format!("cannot open primer scheme '{}'", path.display()))?;
    let mut reader = BedReader::new(BufReader::new(file));
    let records = reader
        .read_all()
        .with_context(|| format!("failed to parse primer scheme '{}'", path.display()))?;
    Ok(PrimerScheme::load(&records)?)
}

fn write_depth_report(path: &Path, scheme: &PrimerScheme, stats: &TrimStats) -> Result<()> {
    let rows: Vec<(String, String, f64)> = scheme
        .amplicons()
        .map(|amplicon| {
            let (start, end) = scheme.insert_span(amplicon);
            let span = end.saturating_sub(start).max(1) as f64;
            let bases = stats.amplicon_bases.get(&amplicon.name).copied().unwrap_or(0) as f64;
            (amplicon.chrom.clone(), amplicon.name.clone(), bases / span)
        })
        .collect();

    let out = File::create(path)
        .with_context(|| format!("cannot create amplicon depth report '{}'", path.display()))?;
    write_amplicon_depths(BufWriter::new(out), &rows)
}
