use std::fs;

use assert_matches::assert_matches;

use ena_quant::config::{Config, ConfigLoader, DEFAULT_CATALOG_URL};
use ena_quant::error::PipelineError;

#[test]
fn parse_full_config() {
    let config = ConfigLoader::parse(
        r#"{
            "schema_version": 1,
            "root": "/scratch/rnaseq",
            "staging_dir": "fastq_tmp",
            "salmon": "/opt/salmon/bin/salmon",
            "index": "/ref/gencode_v44_index",
            "threads": 16,
            "limit": 5000,
            "catalog_url": "https://www.ebi.ac.uk/ena/portal/api/",
            "strict_file_count": false
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config, None);
    assert_eq!(resolved.root, "/scratch/rnaseq");
    assert_eq!(resolved.staging_dir, "/scratch/rnaseq/fastq_tmp");
    assert_eq!(resolved.salmon, "/opt/salmon/bin/salmon");
    assert_eq!(resolved.index, "/ref/gencode_v44_index");
    assert_eq!(resolved.library_type, "A");
    assert_eq!(resolved.threads, Some(16));
    assert_eq!(resolved.limit, 5000);
    assert_eq!(resolved.catalog_url, DEFAULT_CATALOG_URL);
    assert!(!resolved.strict_file_count);
}

#[test]
fn absolute_staging_dir_is_kept() {
    let config = Config {
        staging_dir: Some("/tmp/stage".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config, None);
    assert_eq!(resolved.staging_dir, "/tmp/stage");
}

#[test]
fn unknown_keys_are_rejected() {
    let err = ConfigLoader::parse(r#"{"indx": "typo"}"#).unwrap_err();
    assert_matches!(err, PipelineError::ConfigParse(_));
}

#[test]
fn explicit_missing_file_is_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("missing.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, PipelineError::ConfigRead(_));
}

#[test]
fn explicit_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ena-quant.json");
    fs::write(&path, r#"{"library_type": "ISR", "threads": 0}"#).unwrap();
    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.library_type, "ISR");
    assert_eq!(resolved.threads, None);
}
