use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

static PATH_COMPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid path component regex"));

const DEFAULT_SCHEME: &str = "ftp://";

fn is_path_component(value: &str) -> bool {
    value != "." && value != ".." && PATH_COMPONENT_RE.is_match(value)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_component(trimmed) {
            return Err(PipelineError::InvalidProjectId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Run accession as reported by the catalog. Used verbatim as a directory name,
/// so it has to be a single safe path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunAccession(String);

impl RunAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunAccession {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !is_path_component(trimmed) {
            return Err(PipelineError::InvalidRunAccession(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One row of the ENA `read_run` file report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub run_accession: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fastq_ftp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sample_alias: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sample_accession: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub experiment_accession: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub library_layout: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scientific_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fastq_bytes: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fastq_md5: String,
}

impl RunRecord {
    pub fn accession(&self) -> Result<RunAccession, PipelineError> {
        self.run_accession.parse()
    }

    pub fn file_locations(&self) -> Vec<FileLocation> {
        split_locations(&self.fastq_ftp)
    }

    pub fn declared_layout(&self) -> Option<LibraryLayout> {
        match self.library_layout.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Some(LibraryLayout::Single),
            "PAIRED" => Some(LibraryLayout::Paired),
            _ => None,
        }
    }
}

/// Accepts strings, numbers and `null` for report cells.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryLayout {
    Single,
    Paired,
}

impl LibraryLayout {
    pub fn expected_files(self) -> usize {
        match self {
            LibraryLayout::Single => 1,
            LibraryLayout::Paired => 2,
        }
    }
}

/// A remote read file location, always carrying an explicit scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocation(String);

impl FileLocation {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains("://") {
            Self(raw.to_string())
        } else {
            Self(format!("{DEFAULT_SCHEME}{raw}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn basename(&self) -> &str {
        let without_query = self.0.split(['?', '#']).next().unwrap_or(&self.0);
        without_query
            .rsplit('/')
            .next()
            .unwrap_or(without_query)
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn split_locations(fastq_ftp: &str) -> Vec<FileLocation> {
    fastq_ftp
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(FileLocation::new)
        .collect()
}
