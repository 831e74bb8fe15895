use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

use crate::app::{ProgressEvent, ProgressSink, SamplePhase};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs {msg}";

/// Progress bar over the sample loop, drawn on stderr.
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        bar.set_style(style);
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Log sink that shares the terminal with this bar.
    pub fn log_writer(&self) -> BarLogWriter {
        BarLogWriter {
            bar: self.bar.clone(),
        }
    }
}

/// Writes log lines to stderr with the bar hidden, so each line lands above it
/// instead of through it.
#[derive(Clone)]
pub struct BarLogWriter {
    bar: ProgressBar,
}

impl Write for BarLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bar.suspend(|| io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for BarLogWriter {
    type Writer = BarLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressBarSink {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Begin { total } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(0);
            }
            ProgressEvent::Phase { run, phase } => {
                let verb = match phase {
                    SamplePhase::Downloading => "downloading",
                    SamplePhase::Quantifying => "quantifying",
                };
                self.bar.set_message(format!("{verb} {run}"));
            }
            ProgressEvent::SampleDone { run, outcome } => {
                self.bar.set_message(format!("{run}: {outcome}"));
                self.bar.inc(1);
            }
            ProgressEvent::Aggregating => {
                self.bar.set_message("combining TPMs");
            }
            ProgressEvent::Done => {
                self.bar.finish_with_message("done");
            }
        }
    }
}

impl Drop for ProgressBarSink {
    fn drop(&mut self) {
        if self.bar.is_finished() {
            return;
        }
        if self.bar.length().unwrap_or(0) == 0 {
            self.bar.finish_and_clear();
        } else {
            self.bar.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::SampleOutcome;

    #[test]
    fn counts_finished_samples() {
        let sink = ProgressBarSink::hidden();
        sink.event(ProgressEvent::Begin { total: 3 });
        sink.event(ProgressEvent::SampleDone {
            run: "SRR1".to_string(),
            outcome: SampleOutcome::AlreadyDone,
        });
        sink.event(ProgressEvent::SampleDone {
            run: "SRR2".to_string(),
            outcome: SampleOutcome::Quantified,
        });
        assert_eq!(sink.bar.position(), 2);
        assert_eq!(sink.bar.length(), Some(3));
    }

    #[test]
    fn log_writer_passes_whole_lines_through() {
        let sink = ProgressBarSink::hidden();
        sink.event(ProgressEvent::Begin { total: 1 });
        let mut writer = sink.log_writer();
        let line = b"INFO downloading SRR1\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        writer.flush().unwrap();
        assert_eq!(sink.bar.position(), 0);
    }
}
