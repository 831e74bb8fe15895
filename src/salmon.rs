use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::domain::RunAccession;
use crate::error::PipelineError;
use crate::fs_util::find_in_path;
use crate::store::QUANT_FILE;

/// Only single-end (one file) and paired-end (two files) runs can be quantified.
pub fn validate_file_count(run: &RunAccession, count: usize) -> Result<(), PipelineError> {
    match count {
        1 | 2 => Ok(()),
        count => Err(PipelineError::UnexpectedFileCount {
            run: run.to_string(),
            count,
        }),
    }
}

/// Read files of one run, in the order the catalog listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLayout {
    SingleEnd(PathBuf),
    PairedEnd { forward: PathBuf, reverse: PathBuf },
}

impl ReadLayout {
    pub fn from_files(run: &RunAccession, files: &[PathBuf]) -> Result<Self, PipelineError> {
        match files {
            [single] => Ok(ReadLayout::SingleEnd(single.clone())),
            [forward, reverse] => Ok(ReadLayout::PairedEnd {
                forward: forward.clone(),
                reverse: reverse.clone(),
            }),
            other => Err(PipelineError::UnexpectedFileCount {
                run: run.to_string(),
                count: other.len(),
            }),
        }
    }

    pub fn files(&self) -> Vec<&Path> {
        match self {
            ReadLayout::SingleEnd(path) => vec![path.as_path()],
            ReadLayout::PairedEnd { forward, reverse } => {
                vec![forward.as_path(), reverse.as_path()]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuantSettings {
    pub index: PathBuf,
    pub library_type: String,
    pub threads: Option<u32>,
}

pub fn quant_args(settings: &QuantSettings, layout: &ReadLayout, output_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "quant".to_string(),
        "-i".to_string(),
        settings.index.to_string_lossy().to_string(),
        "-l".to_string(),
        settings.library_type.clone(),
    ];
    if let Some(threads) = settings.threads {
        args.push("-p".to_string());
        args.push(threads.to_string());
    }
    match layout {
        ReadLayout::SingleEnd(reads) => {
            args.push("-r".to_string());
            args.push(reads.to_string_lossy().to_string());
        }
        ReadLayout::PairedEnd { forward, reverse } => {
            args.push("-1".to_string());
            args.push(forward.to_string_lossy().to_string());
            args.push("-2".to_string());
            args.push(reverse.to_string_lossy().to_string());
        }
    }
    args.push("-o".to_string());
    args.push(output_dir.to_string_lossy().to_string());
    args
}

#[derive(Debug, Clone, Serialize)]
pub enum ToolStatus {
    Ready { path: PathBuf },
    Missing { message: String },
}

pub trait QuantTool {
    fn quantify(
        &self,
        run: &RunAccession,
        layout: &ReadLayout,
        output_dir: &Path,
    ) -> Result<(), PipelineError>;
    fn tool_status(&self) -> ToolStatus;
}

impl<Q: QuantTool + ?Sized> QuantTool for &Q {
    fn quantify(
        &self,
        run: &RunAccession,
        layout: &ReadLayout,
        output_dir: &Path,
    ) -> Result<(), PipelineError> {
        (**self).quantify(run, layout, output_dir)
    }

    fn tool_status(&self) -> ToolStatus {
        (**self).tool_status()
    }
}

#[derive(Debug, Clone)]
pub struct SystemSalmon {
    program: String,
    settings: QuantSettings,
}

impl SystemSalmon {
    pub fn new(program: &str, settings: QuantSettings) -> Self {
        Self {
            program: program.to_string(),
            settings,
        }
    }
}

impl QuantTool for SystemSalmon {
    fn quantify(
        &self,
        run: &RunAccession,
        layout: &ReadLayout,
        output_dir: &Path,
    ) -> Result<(), PipelineError> {
        fs::create_dir_all(output_dir)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let args = quant_args(&self.settings, layout, output_dir);
        tracing::debug!(run = %run, "{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|err| PipelineError::QuantificationInvocation {
                run: run.to_string(),
                message: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(PipelineError::QuantificationFailed {
                run: run.to_string(),
                message: failure_message(&output.status, &output.stderr),
            });
        }
        if !output_dir.join(QUANT_FILE).is_file() {
            return Err(PipelineError::QuantificationFailed {
                run: run.to_string(),
                message: format!("{} exited cleanly but wrote no {QUANT_FILE}", self.program),
            });
        }
        Ok(())
    }

    fn tool_status(&self) -> ToolStatus {
        match find_in_path(&self.program) {
            Some(path) => ToolStatus::Ready { path },
            None => ToolStatus::Missing {
                message: format!("{} (salmon) not found on PATH", self.program),
            },
        }
    }
}

fn failure_message(status: &std::process::ExitStatus, stderr: &[u8]) -> String {
    const TAIL_LINES: usize = 5;
    let stderr = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = stderr.lines().filter(|line| !line.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n");
    if tail.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {tail}")
    }
}
