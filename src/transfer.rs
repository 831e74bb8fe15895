use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::FileLocation;
use crate::error::PipelineError;

pub trait TransferAgent {
    /// Makes `staging_dir/<basename>` exist locally and returns its path.
    fn fetch(&self, location: &FileLocation, staging_dir: &Path) -> Result<PathBuf, PipelineError>;
}

impl<A: TransferAgent + ?Sized> TransferAgent for &A {
    fn fetch(&self, location: &FileLocation, staging_dir: &Path) -> Result<PathBuf, PipelineError> {
        (**self).fetch(location, staging_dir)
    }
}

/// Local path a location is staged under.
pub fn staged_path(location: &FileLocation, staging_dir: &Path) -> Result<PathBuf, PipelineError> {
    let name = location.basename();
    if name.is_empty() || name == "." || name == ".." {
        return Err(PipelineError::TransferHttp {
            url: location.to_string(),
            message: "location has no file name".to_string(),
        });
    }
    Ok(staging_dir.join(name))
}

/// The HTTP client has no FTP support; ENA and NCBI serve the same trees over HTTPS.
pub fn transport_url(location: &FileLocation) -> String {
    match location.as_str().strip_prefix("ftp://") {
        Some(rest) => format!("https://{rest}"),
        None => location.as_str().to_string(),
    }
}

#[derive(Clone)]
pub struct HttpTransferAgent {
    client: Client,
}

impl HttpTransferAgent {
    pub fn new() -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ena-quant/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Filesystem(err.to_string()))?,
        );
        // FASTQ files run to tens of gigabytes, so only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| PipelineError::TransferHttp {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), PipelineError> {
        let parent = destination
            .parent()
            .ok_or_else(|| PipelineError::Filesystem("invalid staging path".to_string()))?;
        let mut response =
            self.client
                .get(url)
                .send()
                .map_err(|err| PipelineError::TransferHttp {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;
        if !response.status().is_success() {
            return Err(PipelineError::TransferStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(parent)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut temp).map_err(|err| PipelineError::TransferHttp {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        temp.persist(destination)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl TransferAgent for HttpTransferAgent {
    fn fetch(&self, location: &FileLocation, staging_dir: &Path) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(staging_dir)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let destination = staged_path(location, staging_dir)?;
        if destination.exists() {
            tracing::info!("{} already exists, skipping download", destination.display());
            return Ok(destination);
        }

        let url = transport_url(location);
        tracing::info!("downloading {url}");
        let start = std::time::Instant::now();
        self.download(&url, &destination)?;
        tracing::debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "downloaded {}",
            destination.display()
        );
        Ok(destination)
    }
}
