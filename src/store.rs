use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{ProjectId, RunAccession};
use crate::error::PipelineError;
use crate::fs_util;

pub const QUANT_FILE: &str = "quant.sf";
pub const DEFAULT_STAGING_DIR: &str = "downloaded_files";

/// Filesystem layout of one pipeline working root:
///
/// ```text
/// <root>/<project>/<run>/quant.sf
/// <root>/<staging>/<run>/<basename>
/// <root>/<project>_TPMs.csv
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    staging_root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        let staging_root = root.join(DEFAULT_STAGING_DIR);
        Self { root, staging_root }
    }

    pub fn new_with_paths(root: Utf8PathBuf, staging_root: Utf8PathBuf) -> Self {
        Self { root, staging_root }
    }

    pub fn staging_root(&self) -> &Utf8Path {
        &self.staging_root
    }

    pub fn project_dir(&self, project: &ProjectId) -> Utf8PathBuf {
        self.root.join(project.as_str())
    }

    pub fn sample_dir(&self, project: &ProjectId, run: &RunAccession) -> Utf8PathBuf {
        self.project_dir(project).join(run.as_str())
    }

    pub fn quant_path(&self, project: &ProjectId, run: &RunAccession) -> Utf8PathBuf {
        self.sample_dir(project, run).join(QUANT_FILE)
    }

    pub fn is_quantified(&self, project: &ProjectId, run: &RunAccession) -> bool {
        self.quant_path(project, run).as_std_path().is_file()
    }

    pub fn staging_dir(&self, run: &RunAccession) -> Utf8PathBuf {
        self.staging_root.join(run.as_str())
    }

    pub fn output_path(&self, project: &ProjectId) -> Utf8PathBuf {
        self.root.join(format!("{}_TPMs.csv", project.as_str()))
    }

    pub fn ensure_project_dir(&self, project: &ProjectId) -> Result<(), PipelineError> {
        fs::create_dir_all(self.project_dir(project).as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    /// Staging cleanup removes `<staging>/<run>` recursively, so neither tree may
    /// contain the other.
    pub fn check_staging_layout(&self, project: &ProjectId) -> Result<(), PipelineError> {
        let project_dir = self.project_dir(project);
        if self.staging_root.starts_with(&project_dir) || project_dir.starts_with(&self.staging_root)
        {
            return Err(PipelineError::StagingOverlap {
                staging: self.staging_root.to_string(),
                output: project_dir.to_string(),
            });
        }
        Ok(())
    }

    /// Opens the per-sample staging area. Everything inside it is removed when the
    /// returned guard goes out of scope.
    pub fn stage(&self, run: &RunAccession) -> Result<StagingArea, PipelineError> {
        let dir = self.staging_dir(run);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(StagingArea {
            run: run.clone(),
            dir,
        })
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
        let parent = path
            .parent()
            .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".ena-quant-out")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        std::io::Write::write_all(&mut temp, content)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Scope guard over `<staging>/<run>`.
#[derive(Debug)]
pub struct StagingArea {
    run: RunAccession,
    dir: Utf8PathBuf,
}

impl StagingArea {
    pub fn path(&self) -> &Path {
        self.dir.as_std_path()
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn clear(&self) {
        let entries = match fs::read_dir(self.dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!(run = %self.run, "cannot list staging dir {}: {err}", self.dir);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if let Err(err) = fs::remove_dir_all(&path) {
                    tracing::warn!(run = %self.run, "failed to remove {}: {err}", path.display());
                }
            } else {
                fs_util::delete_file(&path);
            }
        }
        if let Err(err) = fs::remove_dir(self.dir.as_std_path()) {
            tracing::warn!(run = %self.run, "failed to remove staging dir {}: {err}", self.dir);
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("work"));
        let project: ProjectId = "PRJNA1".parse().unwrap();
        let run: RunAccession = "SRR14".parse().unwrap();

        assert_eq!(store.quant_path(&project, &run), "work/PRJNA1/SRR14/quant.sf");
        assert_eq!(store.staging_dir(&run), "work/downloaded_files/SRR14");
        assert_eq!(store.output_path(&project), "work/PRJNA1_TPMs.csv");
    }

    #[test]
    fn staging_must_not_nest_with_project_dir() {
        let store = Store::new(Utf8PathBuf::from("work"));
        let project: ProjectId = "PRJNA1".parse().unwrap();
        assert!(store.check_staging_layout(&project).is_ok());

        let clashing: ProjectId = DEFAULT_STAGING_DIR.parse().unwrap();
        assert!(matches!(
            store.check_staging_layout(&clashing),
            Err(PipelineError::StagingOverlap { .. })
        ));

        let inside = Store::new_with_paths(
            Utf8PathBuf::from("work"),
            Utf8PathBuf::from("work/PRJNA1/tmp"),
        );
        assert!(inside.check_staging_layout(&project).is_err());

        let around = Store::new_with_paths(Utf8PathBuf::from("work"), Utf8PathBuf::from("work"));
        assert!(around.check_staging_layout(&project).is_err());
    }

    #[test]
    fn staging_guard_removes_files() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);
        let run: RunAccession = "SRR1".parse().unwrap();

        let staged = {
            let area = store.stage(&run).unwrap();
            let file = area.path().join("SRR1_1.fastq.gz");
            fs::write(&file, b"@r\nA\n+\nI\n").unwrap();
            assert!(file.exists());
            file
        };
        assert!(!staged.exists());
        assert!(!store.staging_dir(&run).as_std_path().exists());
    }
}
