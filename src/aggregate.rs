use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{ProjectId, RunRecord};
use crate::error::PipelineError;
use crate::fs_util;
use crate::store::{QUANT_FILE, Store};

pub const NAME_COLUMN: &str = "Name";

#[derive(Debug, Clone, Deserialize)]
struct QuantRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "TPM")]
    tpm: f64,
}

/// `Name` → `TPM` pairs of one `quant.sf`, in file order.
pub fn load_quant_table(path: &Path) -> Result<Vec<(String, f64)>, PipelineError> {
    let load_error = |message: String| PipelineError::LoadError {
        path: path.to_path_buf(),
        message,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|err| load_error(err.to_string()))?;
    let headers = reader.headers().map_err(|err| load_error(err.to_string()))?;
    for required in [NAME_COLUMN, "TPM"] {
        if !headers.iter().any(|header| header == required) {
            return Err(load_error(format!("missing column {required}")));
        }
    }

    let mut rows = Vec::new();
    for row in reader.deserialize::<QuantRow>() {
        let row = row.map_err(|err| load_error(err.to_string()))?;
        rows.push((row.name, row.tpm));
    }
    Ok(rows)
}

/// Transcript × sample TPM matrix. Rows are the union of every added column's
/// transcripts; a sample without a transcript holds `None` there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedMatrix {
    columns: Vec<String>,
    rows: BTreeMap<String, Vec<Option<f64>>>,
}

impl AggregatedMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn transcript_count(&self) -> usize {
        self.rows.len()
    }

    pub fn transcripts(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn value(&self, transcript: &str, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows.get(transcript).and_then(|row| row[index])
    }

    /// Outer-joins one sample's values onto the matrix on transcript name.
    pub fn add_column<I>(&mut self, column: String, values: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        self.columns.push(column);
        let width = self.columns.len();
        for row in self.rows.values_mut() {
            row.push(None);
        }
        for (transcript, tpm) in values {
            let row = self
                .rows
                .entry(transcript)
                .or_insert_with(|| vec![None; width]);
            row[width - 1] = Some(tpm);
        }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(NAME_COLUMN);
        header.extend(self.columns.iter().map(String::as_str));
        writer
            .write_record(&header)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

        for (transcript, values) in &self.rows {
            let mut record = Vec::with_capacity(values.len() + 1);
            record.push(transcript.clone());
            record.extend(
                values
                    .iter()
                    .map(|value| value.map(|tpm| tpm.to_string()).unwrap_or_default()),
            );
            writer
                .write_record(&record)
                .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    pub fn write_csv(&self, path: &Utf8Path) -> Result<(), PipelineError> {
        let bytes = self.to_csv_bytes()?;
        Store::write_bytes_atomic(path, &bytes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedSample {
    pub run: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub matrix: AggregatedMatrix,
    pub excluded: Vec<ExcludedSample>,
}

/// Builds the matrix from every `<root>/<project>/<run>/quant.sf`, naming each
/// column by the run's `sample_alias`.
pub fn aggregate(
    store: &Store,
    project: &ProjectId,
    records: &[RunRecord],
) -> Result<Aggregation, PipelineError> {
    let aliases: HashMap<&str, &str> = records
        .iter()
        .map(|record| (record.run_accession.trim(), record.sample_alias.trim()))
        .collect();

    let project_dir = store.project_dir(project);
    let sample_dirs = fs_util::list_subdirectories(project_dir.as_std_path())?;
    tracing::info!(
        project = %project,
        samples = sample_dirs.len(),
        "combining TPMs into a single table"
    );

    let mut matrix = AggregatedMatrix::new();
    let mut used: HashSet<String> = HashSet::new();
    let mut excluded = Vec::new();

    for sample_dir in sample_dirs {
        let run = dir_name(&sample_dir);
        let table = match load_quant_table(&sample_dir.join(QUANT_FILE)) {
            Ok(table) => table,
            Err(err) => {
                tracing::warn!(run = %run, "could not load quantification data: {err}");
                excluded.push(ExcludedSample {
                    run,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let alias = match aliases.get(run.as_str()).filter(|alias| !alias.is_empty()) {
            Some(alias) => alias.to_string(),
            None => {
                let err = PipelineError::AliasUnresolved(run.clone());
                tracing::warn!(run = %run, "{err}; leaving it out of the table");
                excluded.push(ExcludedSample {
                    run,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let column = unique_column(&used, &alias, &run);
        if column != alias {
            tracing::warn!(run = %run, "sample alias {alias} already used, naming column {column}");
        }
        used.insert(column.clone());
        matrix.add_column(column, table);
    }

    if matrix.is_empty() {
        return Err(PipelineError::EmptyAggregation(project.to_string()));
    }
    Ok(Aggregation { matrix, excluded })
}

/// `alias`, else `<alias>_<run>`, else `<alias>_<run>_<n>` for the first free `n`.
fn unique_column(used: &HashSet<String>, alias: &str, run: &str) -> String {
    if !used.contains(alias) {
        return alias.to_string();
    }
    let renamed = format!("{alias}_{run}");
    if !used.contains(&renamed) {
        return renamed;
    }
    (2..)
        .map(|n| format!("{renamed}_{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(renamed)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
