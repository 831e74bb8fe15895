//! Batch retrieval and quantification of the RNA-seq runs of an ENA bioproject.
//!
//! The pipeline fetches the project's run list, downloads each run's FASTQ files,
//! quantifies them with `salmon quant`, deletes the reads again, and finally merges
//! every `quant.sf` into one transcript × sample TPM table.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod domain;
pub mod ena;
pub mod error;
pub mod fs_util;
pub mod output;
pub mod progress;
pub mod salmon;
pub mod store;
pub mod transfer;
