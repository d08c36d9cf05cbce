use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use genome_pipeline::annotation::{AnnotationRequest, Annotator};
use genome_pipeline::batch::{BatchReport, Cancellation, LogProgress, ProgressSink};
use genome_pipeline::config::{ConfigLoader, ResolvedConfig};
use genome_pipeline::download::{DownloadRequest, Downloader};
use genome_pipeline::error::PipelineError;
use genome_pipeline::executor::SystemExecutor;
use genome_pipeline::fs_util::absolute_utf8;
use genome_pipeline::masking::{Masker, MaskingRequest};
use genome_pipeline::output::{JsonOutput, OutputMode, TextOutput};

#[derive(Parser)]
#[command(name = "genome-pipeline")]
#[command(about = "Download, repeat-mask and annotate a batch of genome assemblies")]
#[command(version)]
struct Cli {
    /// Print the batch report as JSON instead of a text summary
    #[arg(long, global = true)]
    json: bool,

    /// Tool locations and failure policies (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download genomes from NCBI for a list of accessions")]
    Download(DownloadArgs),
    #[command(about = "Run RepeatModeler and RepeatMasker on every *.fasta genome")]
    Mask(MaskArgs),
    #[command(about = "Run BRAKER on every masked genome")]
    Annotate(AnnotateArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Text file with one accession per line
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: PathBuf,

    /// Directory receiving <accession>.fasta files
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,

    /// Working directory for the download tool's archive (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,
}

#[derive(Args)]
struct MaskArgs {
    /// Directory containing genome *.fasta files
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    input: PathBuf,

    /// Threads handed to RepeatModeler and RepeatMasker
    #[arg(short = 't', long = "threads", value_name = "THREADS")]
    threads: NonZeroUsize,

    /// Output directory for all results
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,
}

#[derive(Args)]
struct AnnotateArgs {
    /// Directory containing <genome>/repeatmasker_out/*.masked
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    input: PathBuf,

    /// Protein evidence FASTA shared by every genome
    #[arg(short = 'p', long = "proteins", value_name = "PATH")]
    proteins: PathBuf,

    /// Threads handed to BRAKER
    #[arg(short = 't', long = "threads", value_name = "THREADS")]
    threads: NonZeroUsize,

    /// Output directory for all BRAKER results
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let cancel = Cancellation::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, stopping after the current tool");
        handler.cancel();
    })
    .into_diagnostic()?;

    let report = match cli.command {
        Commands::Download(args) => run_download(args, &config, output_mode, &cancel)?,
        Commands::Mask(args) => run_mask(args, &config, output_mode, &cancel)?,
        Commands::Annotate(args) => run_annotate(args, &config, output_mode, &cancel)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_report(&report).into_diagnostic()?,
    }
    report.into_result()?;
    Ok(())
}

fn sink_for(output_mode: OutputMode) -> &'static dyn ProgressSink {
    match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogProgress,
    }
}

fn run_download(
    args: DownloadArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
    cancel: &Cancellation,
) -> Result<BatchReport, PipelineError> {
    let scratch_dir = match args.scratch_dir {
        Some(dir) => absolute_utf8(&dir)?,
        None => absolute_utf8(std::path::Path::new("."))?,
    };
    let request = DownloadRequest {
        accessions_file: absolute_utf8(&args.file)?,
        output_dir: absolute_utf8(&args.output)?,
        scratch_dir,
    };
    Downloader::new(SystemExecutor, config).run(&request, sink_for(output_mode), cancel)
}

fn run_mask(
    args: MaskArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
    cancel: &Cancellation,
) -> Result<BatchReport, PipelineError> {
    let request = MaskingRequest {
        input_dir: absolute_utf8(&args.input)?,
        output_dir: absolute_utf8(&args.output)?,
        threads: args.threads.get(),
    };
    Masker::new(SystemExecutor, config).run(&request, sink_for(output_mode), cancel)
}

fn run_annotate(
    args: AnnotateArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
    cancel: &Cancellation,
) -> Result<BatchReport, PipelineError> {
    let request = AnnotationRequest {
        input_dir: absolute_utf8(&args.input)?,
        proteins: absolute_utf8(&args.proteins)?,
        output_dir: absolute_utf8(&args.output)?,
        threads: args.threads.get(),
    };
    Annotator::new(SystemExecutor, config).run(&request, sink_for(output_mode), cancel)
}
