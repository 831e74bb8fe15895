use std::io::{self, Write};

use serde::Serialize;

use crate::app::{PipelineSummary, SampleOutcome};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &PipelineSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

pub fn print_summary_text(summary: &PipelineSummary) {
    eprintln!(
        "{}: {} runs ({} quantified, {} already done, {} download failed, {} quantification failed, {} skipped)",
        summary.project,
        summary.runs,
        summary.count(SampleOutcome::Quantified),
        summary.count(SampleOutcome::AlreadyDone),
        summary.count(SampleOutcome::DownloadFailed),
        summary.count(SampleOutcome::QuantificationFailed),
        summary.count(SampleOutcome::Skipped),
    );
    eprintln!(
        "wrote {} ({} samples x {} transcripts)",
        summary.aggregated.output,
        summary.aggregated.columns.len(),
        summary.aggregated.transcripts
    );
    for excluded in &summary.aggregated.excluded {
        eprintln!("  excluded {}: {}", excluded.run, excluded.reason);
    }
}
