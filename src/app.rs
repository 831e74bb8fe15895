use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::aggregate::{self, ExcludedSample};
use crate::domain::{ProjectId, RunAccession, RunRecord};
use crate::ena::MetadataClient;
use crate::error::PipelineError;
use crate::salmon::{QuantTool, ReadLayout, ToolStatus, validate_file_count};
use crate::store::Store;
use crate::transfer::TransferAgent;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// A run with other than one or two FASTQ files aborts the whole batch when set,
    /// and is skipped otherwise.
    pub strict_file_count: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strict_file_count: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    AlreadyDone,
    DownloadFailed,
    Quantified,
    QuantificationFailed,
    Skipped,
}

impl fmt::Display for SampleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SampleOutcome::AlreadyDone => "already done",
            SampleOutcome::DownloadFailed => "download failed",
            SampleOutcome::Quantified => "quantified",
            SampleOutcome::QuantificationFailed => "quantification failed",
            SampleOutcome::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub run: String,
    pub outcome: SampleOutcome,
    pub error: Option<String>,
}

impl SampleReport {
    fn new(run: &str, outcome: SampleOutcome) -> Self {
        Self {
            run: run.to_string(),
            outcome,
            error: None,
        }
    }

    fn failed(run: &str, outcome: SampleOutcome, err: &PipelineError) -> Self {
        Self {
            run: run.to_string(),
            outcome,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub output: String,
    pub columns: Vec<String>,
    pub transcripts: usize,
    pub excluded: Vec<ExcludedSample>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub project: String,
    pub runs: usize,
    pub samples: Vec<SampleReport>,
    pub aggregated: AggregateReport,
}

impl PipelineSummary {
    pub fn count(&self, outcome: SampleOutcome) -> usize {
        self.samples
            .iter()
            .filter(|sample| sample.outcome == outcome)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePhase {
    Downloading,
    Quantifying,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Begin { total: usize },
    Phase { run: String, phase: SamplePhase },
    SampleDone { run: String, outcome: SampleOutcome },
    Aggregating,
    Done,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<M: MetadataClient, T: TransferAgent, Q: QuantTool> {
    store: Store,
    catalog: M,
    transfer: T,
    quant: Q,
    options: RunOptions,
}

impl<M: MetadataClient, T: TransferAgent, Q: QuantTool> App<M, T, Q> {
    pub fn new(store: Store, catalog: M, transfer: T, quant: Q, options: RunOptions) -> Self {
        Self {
            store,
            catalog,
            transfer,
            quant,
            options,
        }
    }

    /// Fetches the run list, processes every run, then merges whatever
    /// `quant.sf` tables exist into `<project>_TPMs.csv`.
    pub fn run(
        &self,
        project: &ProjectId,
        sink: &dyn ProgressSink,
    ) -> Result<PipelineSummary, PipelineError> {
        self.store.check_staging_layout(project)?;
        let records = self.catalog.fetch_runs(project)?;
        tracing::info!(project = %project, runs = records.len(), "fetched run metadata");

        if self.has_pending(project, &records) {
            if let ToolStatus::Missing { message } = self.quant.tool_status() {
                return Err(PipelineError::MissingTool(message));
            }
        }
        self.store.ensure_project_dir(project)?;

        sink.event(ProgressEvent::Begin {
            total: records.len(),
        });
        let mut samples = Vec::with_capacity(records.len());
        for record in &records {
            let report = self.process_sample(project, record, sink)?;
            sink.event(ProgressEvent::SampleDone {
                run: report.run.clone(),
                outcome: report.outcome,
            });
            samples.push(report);
        }

        sink.event(ProgressEvent::Aggregating);
        let aggregation = aggregate::aggregate(&self.store, project, &records)?;
        let output = self.store.output_path(project);
        aggregation.matrix.write_csv(&output)?;
        tracing::info!(
            output = %output,
            samples = aggregation.matrix.columns().len(),
            transcripts = aggregation.matrix.transcript_count(),
            "wrote TPM table"
        );
        sink.event(ProgressEvent::Done);

        Ok(PipelineSummary {
            project: project.to_string(),
            runs: records.len(),
            samples,
            aggregated: AggregateReport {
                output: output.to_string(),
                columns: aggregation.matrix.columns().to_vec(),
                transcripts: aggregation.matrix.transcript_count(),
                excluded: aggregation.excluded,
                finished_at: chrono::Utc::now().to_rfc3339(),
            },
        })
    }

    /// One run through download, quantification and cleanup. Only a fatal file
    /// count escapes as `Err`; every other failure ends up in the report.
    pub fn process_sample(
        &self,
        project: &ProjectId,
        record: &RunRecord,
        sink: &dyn ProgressSink,
    ) -> Result<SampleReport, PipelineError> {
        let run = match record.accession() {
            Ok(run) => run,
            Err(err) => {
                tracing::warn!("skipping record: {err}");
                return Ok(SampleReport::failed(
                    &record.run_accession,
                    SampleOutcome::Skipped,
                    &err,
                ));
            }
        };

        if self.store.is_quantified(project, &run) {
            tracing::info!(run = %run, "sample already processed, skipping");
            return Ok(SampleReport::new(run.as_str(), SampleOutcome::AlreadyDone));
        }

        let locations = record.file_locations();
        if let Err(err) = validate_file_count(&run, locations.len()) {
            if self.options.strict_file_count {
                return Err(err);
            }
            tracing::warn!(run = %run, "{err}; skipping sample");
            return Ok(SampleReport::failed(run.as_str(), SampleOutcome::Skipped, &err));
        }
        if let Some(declared) = record.declared_layout() {
            if declared.expected_files() != locations.len() {
                tracing::warn!(
                    run = %run,
                    layout = %record.library_layout,
                    files = locations.len(),
                    "library layout disagrees with the number of FASTQ files"
                );
            }
        }

        sink.event(ProgressEvent::Phase {
            run: run.to_string(),
            phase: SamplePhase::Downloading,
        });
        let staging = match self.store.stage(&run) {
            Ok(staging) => staging,
            Err(err) => return Ok(self.download_failed(&run, err)),
        };
        let mut files: Vec<PathBuf> = Vec::with_capacity(locations.len());
        for location in &locations {
            match self.transfer.fetch(location, staging.path()) {
                Ok(path) => files.push(path),
                Err(err) => return Ok(self.download_failed(&run, err)),
            }
        }

        sink.event(ProgressEvent::Phase {
            run: run.to_string(),
            phase: SamplePhase::Quantifying,
        });
        let layout = ReadLayout::from_files(&run, &files)?;
        let output_dir = self.store.sample_dir(project, &run);
        let report = match self.quant.quantify(&run, &layout, output_dir.as_std_path()) {
            Ok(()) => {
                tracing::info!(run = %run, "quantified");
                SampleReport::new(run.as_str(), SampleOutcome::Quantified)
            }
            Err(err) if err.is_sample_scoped() => {
                tracing::error!(run = %run, "error quantifying files: {err}");
                SampleReport::failed(run.as_str(), SampleOutcome::QuantificationFailed, &err)
            }
            Err(err) => return Err(err),
        };

        tracing::debug!(run = %run, staging = %staging.dir(), "removing staged FASTQ files");
        drop(staging);
        Ok(report)
    }

    fn has_pending(&self, project: &ProjectId, records: &[RunRecord]) -> bool {
        records.iter().any(|record| {
            record
                .accession()
                .map(|run| !self.store.is_quantified(project, &run))
                .unwrap_or(false)
        })
    }

    fn download_failed(&self, run: &RunAccession, err: PipelineError) -> SampleReport {
        tracing::error!(run = %run, "error downloading files, skipping sample: {err}");
        SampleReport::failed(run.as_str(), SampleOutcome::DownloadFailed, &err)
    }
}
