use std::fs;
use std::path::Path;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use ena_quant::aggregate::{AggregatedMatrix, aggregate, load_quant_table};
use ena_quant::domain::{ProjectId, RunAccession, RunRecord};
use ena_quant::error::PipelineError;
use ena_quant::store::Store;

fn place(store: &Store, project: &ProjectId, run: &str, fixture: &str) {
    let run: RunAccession = run.parse().unwrap();
    fs::create_dir_all(store.sample_dir(project, &run).as_std_path()).unwrap();
    fs::copy(fixture, store.quant_path(project, &run).as_std_path()).unwrap();
}

fn record(run: &str, alias: &str) -> RunRecord {
    RunRecord {
        run_accession: run.to_string(),
        sample_alias: alias.to_string(),
        ..RunRecord::default()
    }
}

#[test]
fn load_keeps_name_and_tpm() {
    let rows = load_quant_table(Path::new("tests/fixtures/quant_a.sf")).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], ("ENST00000456328.2".to_string(), 0.514));
    assert_eq!(rows[2].1, 12.75);
}

#[test]
fn load_requires_tpm_column() {
    let err = load_quant_table(Path::new("tests/fixtures/quant_no_tpm.sf")).unwrap_err();
    assert_matches!(err, PipelineError::LoadError { .. });
}

#[test]
fn load_missing_file_is_load_error() {
    let err = load_quant_table(Path::new("tests/fixtures/does_not_exist.sf")).unwrap_err();
    assert_matches!(err, PipelineError::LoadError { .. });
}

#[test]
fn merge_order_only_changes_column_order() {
    let a = load_quant_table(Path::new("tests/fixtures/quant_a.sf")).unwrap();
    let b = load_quant_table(Path::new("tests/fixtures/quant_b.sf")).unwrap();

    let mut ab = AggregatedMatrix::new();
    ab.add_column("A".to_string(), a.clone());
    ab.add_column("B".to_string(), b.clone());
    let mut ba = AggregatedMatrix::new();
    ba.add_column("B".to_string(), b);
    ba.add_column("A".to_string(), a);

    assert_eq!(
        ab.transcripts().collect::<Vec<_>>(),
        ba.transcripts().collect::<Vec<_>>()
    );
    for transcript in ab.transcripts() {
        for column in ["A", "B"] {
            assert_eq!(ab.value(transcript, column), ba.value(transcript, column));
        }
    }
}

#[test]
fn columns_are_named_by_alias_and_unresolved_runs_are_excluded() {
    let temp = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let project: ProjectId = "PRJNA1".parse().unwrap();
    place(&store, &project, "SRR1", "tests/fixtures/quant_a.sf");
    place(&store, &project, "SRR2", "tests/fixtures/quant_b.sf");
    place(&store, &project, "SRR3", "tests/fixtures/quant_b.sf");
    place(&store, &project, "SRR4", "tests/fixtures/quant_b.sf");

    let records = vec![
        record("SRR1", "GSM1"),
        record("SRR2", "GSM2"),
        record("SRR4", ""),
    ];
    let aggregation = aggregate(&store, &project, &records).unwrap();

    assert_eq!(aggregation.matrix.columns(), ["GSM1", "GSM2"]);
    let excluded: Vec<_> = aggregation.excluded.iter().map(|e| e.run.as_str()).collect();
    assert_eq!(excluded, vec!["SRR3", "SRR4"]);
}

#[test]
fn duplicate_alias_gets_run_suffix() {
    let temp = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let project: ProjectId = "PRJNA1".parse().unwrap();
    place(&store, &project, "SRR1", "tests/fixtures/quant_a.sf");
    place(&store, &project, "SRR2", "tests/fixtures/quant_b.sf");

    let records = vec![record("SRR1", "GSM9"), record("SRR2", "GSM9")];
    let aggregation = aggregate(&store, &project, &records).unwrap();

    assert_eq!(aggregation.matrix.columns(), ["GSM9", "GSM9_SRR2"]);
}

#[test]
fn no_sample_dirs_is_empty_aggregation() {
    let temp = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let project: ProjectId = "PRJNA1".parse().unwrap();

    let err = aggregate(&store, &project, &[record("SRR1", "GSM1")]).unwrap_err();
    assert_matches!(err, PipelineError::EmptyAggregation(_));
}

#[test]
fn written_table_round_trips_through_csv() {
    let temp = tempfile::tempdir().unwrap();
    let out = Utf8PathBuf::from_path_buf(temp.path().join("PRJNA1_TPMs.csv")).unwrap();
    let mut matrix = AggregatedMatrix::new();
    matrix.add_column("GSM1".to_string(), vec![("tx1".to_string(), 2.5)]);
    matrix.write_csv(&out).unwrap();

    let mut reader = csv::Reader::from_path(out.as_std_path()).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["Name", "GSM1"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][1], "2.5");
}

#[test]
fn renamed_duplicate_never_reuses_a_taken_column() {
    let temp = tempfile::tempdir().unwrap();
    let store = Store::new(Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap());
    let project: ProjectId = "PRJNA1".parse().unwrap();
    for run in ["SRR1", "SRR2", "SRR3"] {
        place(&store, &project, run, "tests/fixtures/quant_b.sf");
    }

    let records = vec![
        record("SRR1", "X"),
        record("SRR2", "X_SRR3"),
        record("SRR3", "X"),
    ];
    let aggregation = aggregate(&store, &project, &records).unwrap();

    assert_eq!(aggregation.matrix.columns(), ["X", "X_SRR3", "X_SRR3_2"]);
}
