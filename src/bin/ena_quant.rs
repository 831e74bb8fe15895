use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use ena_quant::app::{App, RunOptions};
use ena_quant::config::ConfigLoader;
use ena_quant::domain::ProjectId;
use ena_quant::ena::EnaHttpClient;
use ena_quant::error::PipelineError;
use ena_quant::output::{JsonOutput, OutputMode, print_summary_text};
use ena_quant::progress::ProgressBarSink;
use ena_quant::salmon::{QuantSettings, SystemSalmon};
use ena_quant::store::Store;
use ena_quant::transfer::HttpTransferAgent;

#[derive(Parser)]
#[command(name = "ena-quant")]
#[command(about = "Download, quantify and merge the RNA-seq runs of an ENA bioproject")]
#[command(version, author)]
struct Cli {
    /// Bioproject accession, e.g. PRJNA231202
    project: String,

    /// Path to a JSON config file (default: ./ena-quant.json if present)
    #[arg(long)]
    config: Option<String>,

    /// Print the run summary as JSON on stdout instead of drawing a progress bar
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::InvalidProjectId(_)
        | PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::StagingOverlap { .. } => 2,
        PipelineError::MetadataHttp(_)
        | PipelineError::MetadataStatus { .. }
        | PipelineError::MetadataParse(_)
        | PipelineError::MissingTool(_) => 3,
        PipelineError::UnexpectedFileCount { .. } => 4,
        PipelineError::EmptyAggregation(_) => 5,
        _ => 1,
    }
}

fn init_tracing(bar: Option<&ProgressBarSink>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match bar {
        Some(bar) => BoxMakeWriter::new(bar.log_writer()),
        None => BoxMakeWriter::new(std::io::stderr),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .init();
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Interactive
    };
    let bar = match output_mode {
        OutputMode::Interactive => Some(ProgressBarSink::new()),
        OutputMode::Json => None,
    };
    init_tracing(bar.as_ref());

    let project: ProjectId = cli.project.parse()?;
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    tracing::debug!(?config, "resolved configuration");

    let store = Store::new_with_paths(config.root.clone(), config.staging_dir.clone());
    let catalog = EnaHttpClient::new(
        &config.catalog_url,
        config.limit,
        Duration::from_secs(config.timeout_secs),
    )?;
    let transfer = HttpTransferAgent::new()?;
    let salmon = SystemSalmon::new(
        &config.salmon,
        QuantSettings {
            index: config.index.clone().into_std_path_buf(),
            library_type: config.library_type.clone(),
            threads: config.threads,
        },
    );
    let app = App::new(
        store,
        catalog,
        transfer,
        salmon,
        RunOptions {
            strict_file_count: config.strict_file_count,
        },
    );

    match bar {
        None => {
            let summary = app.run(&project, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        Some(sink) => {
            let summary = app.run(&project, &sink)?;
            drop(sink);
            print_summary_text(&summary);
        }
    }
    Ok(())
}
