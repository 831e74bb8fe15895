use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{ProjectId, RunRecord};
use crate::error::PipelineError;

/// Field set requested from the `read_run` file report.
pub const RUN_FIELDS: &[&str] = &[
    "study_accession",
    "secondary_study_accession",
    "sample_accession",
    "secondary_sample_accession",
    "experiment_accession",
    "run_accession",
    "submission_accession",
    "tax_id",
    "scientific_name",
    "instrument_platform",
    "instrument_model",
    "library_name",
    "nominal_length",
    "library_layout",
    "library_strategy",
    "library_source",
    "library_selection",
    "read_count",
    "base_count",
    "center_name",
    "first_public",
    "last_updated",
    "experiment_title",
    "study_title",
    "study_alias",
    "experiment_alias",
    "run_alias",
    "fastq_bytes",
    "fastq_md5",
    "fastq_ftp",
    "fastq_aspera",
    "fastq_galaxy",
    "submitted_bytes",
    "submitted_md5",
    "submitted_ftp",
    "submitted_aspera",
    "submitted_galaxy",
    "submitted_format",
    "sra_bytes",
    "sra_md5",
    "sra_ftp",
    "sra_aspera",
    "sra_galaxy",
    "sample_alias",
    "broker_name",
    "sample_title",
    "nominal_sdev",
    "first_created",
    "bam_ftp",
    "bam_bytes",
    "bam_md5",
];

pub trait MetadataClient {
    fn fetch_runs(&self, project: &ProjectId) -> Result<Vec<RunRecord>, PipelineError>;
}

impl<C: MetadataClient + ?Sized> MetadataClient for &C {
    fn fetch_runs(&self, project: &ProjectId) -> Result<Vec<RunRecord>, PipelineError> {
        (**self).fetch_runs(project)
    }
}

#[derive(Clone)]
pub struct EnaHttpClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl EnaHttpClient {
    pub fn new(base_url: &str, limit: u32, timeout: Duration) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ena-quant/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::MetadataHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::MetadataHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        })
    }

    pub fn filereport_url(&self) -> String {
        format!("{}/filereport", self.base_url)
    }

    pub fn query_params(&self, project: &ProjectId) -> Vec<(&'static str, String)> {
        vec![
            ("result", "read_run".to_string()),
            ("accession", project.as_str().to_string()),
            ("limit", self.limit.to_string()),
            ("format", "json".to_string()),
            ("fields", RUN_FIELDS.join(",")),
        ]
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, PipelineError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::debug!(status, attempt, "retrying ENA request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::debug!(attempt, "retrying ENA request: {err}");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(PipelineError::MetadataHttp(err.to_string()));
                }
            }
        }
    }
}

impl MetadataClient for EnaHttpClient {
    fn fetch_runs(&self, project: &ProjectId) -> Result<Vec<RunRecord>, PipelineError> {
        let url = self.filereport_url();
        let params = self.query_params(project);
        tracing::info!(project = %project, "requesting run metadata from ENA");
        let response = self.send_with_retries(|| self.client.get(&url).query(&params))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(PipelineError::MetadataStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| PipelineError::MetadataHttp(err.to_string()))?;
        let runs = parse_run_records(&body)?;
        if runs.len() as u64 >= u64::from(self.limit) {
            tracing::warn!(
                project = %project,
                limit = self.limit,
                "run list reached the request limit and may be truncated"
            );
        }
        Ok(runs)
    }
}

/// Parses a `format=json` file report. ENA answers an empty body when nothing
/// matches.
pub fn parse_run_records(body: &str) -> Result<Vec<RunRecord>, PipelineError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|err| PipelineError::MetadataParse(err.to_string()))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
