//! Stage-by-stage tests over the sample FIRDS files

use firds_ingest::annotate::{annotate, A_COUNT_COLUMN, CONTAINS_A_COLUMN};
use firds_ingest::extract::{collect_table, extract, InstrumentRecords, COLUMNS};
use firds_ingest::index::{select_link, select_link_from_file, IndexDocument, TARGET_FILE_TYPE};
use firds_ingest::IngestError;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

// ============================================================================
// Index
// ============================================================================

#[test]
fn test_index_fixture_candidates_in_document_order() {
    let bytes = std::fs::read(fixture("index_sample.xml")).unwrap();
    let document = IndexDocument::parse(&bytes).unwrap();

    assert_eq!(document.entries().len(), 4);

    let urls: Vec<_> = document
        .link_candidates(TARGET_FILE_TYPE)
        .into_iter()
        .map(|c| c.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "{{BASE_URL}}/firds/DLTINS_20210117_01of01.zip",
            "{{BASE_URL}}/firds/DLTINS_20210118_01of01.zip",
            "{{BASE_URL}}/firds/DLTINS_20210119_01of02.zip",
        ]
    );
}

#[test]
fn test_index_fixture_selection() {
    let path = fixture("index_sample.xml");

    assert_eq!(
        select_link_from_file(&path, TARGET_FILE_TYPE, 1).unwrap(),
        "{{BASE_URL}}/firds/DLTINS_20210118_01of01.zip"
    );
    assert_eq!(
        select_link_from_file(&path, "FULINS", 0).unwrap(),
        "{{BASE_URL}}/firds/FULINS_C_20210117_01of01.zip"
    );

    let err = select_link_from_file(&path, TARGET_FILE_TYPE, 3).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Only 3 DLTINS links found, index 3 is out of range"
    );
}

#[test]
fn test_index_truncated_fixture_is_malformed() {
    let bytes = std::fs::read(fixture("index_sample.xml")).unwrap();
    let truncated = &bytes[..bytes.len() / 2];

    let err = select_link(truncated, TARGET_FILE_TYPE, 0).unwrap_err();
    assert!(matches!(err, IngestError::MalformedDocument { .. }), "{:?}", err);
}

#[test]
fn test_index_missing_file() {
    let err = select_link_from_file(fixture("missing.xml"), TARGET_FILE_TYPE, 0).unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));
}

// ============================================================================
// Extraction and annotation
// ============================================================================

#[test]
fn test_extract_fixture() {
    let mut records = extract(fixture("dltins_sample.xml")).unwrap();
    let table = collect_table(records.by_ref()).unwrap();

    assert_eq!(records.emitted(), 3);
    assert_eq!(records.skipped(), 0);
    assert_eq!(table.columns(), &COLUMNS);
    assert_eq!(
        table.rows()[0],
        vec![
            "DE000A1R07V3",
            "Kreditanstalt fuer Wiederaufbau",
            "DBFTFB",
            "false",
            "EUR",
            "549300GDPG70E3MBBU98",
        ]
    );
    assert_eq!(
        table.rows()[2],
        vec!["XS1234567890", "Banca Monte", "DTFXFB", "false", "", ""]
    );
}

#[test]
fn test_extract_fixture_is_lazy() {
    let file = std::fs::File::open(fixture("dltins_sample.xml")).unwrap();
    let mut records =
        InstrumentRecords::from_reader(std::io::BufReader::new(file), "dltins_sample.xml");

    let first = records.next().unwrap().unwrap();
    assert_eq!(first.id, "DE000A1R07V3");
    assert_eq!(records.emitted(), 1);
}

#[test]
fn test_annotate_fixture() {
    let mut table = collect_table(extract(fixture("dltins_sample.xml")).unwrap()).unwrap();
    annotate(&mut table).unwrap();

    assert_eq!(table.column(A_COUNT_COLUMN).unwrap(), vec!["4", "0", "2"]);
    assert_eq!(table.column(CONTAINS_A_COLUMN).unwrap(), vec!["YES", "NO", "YES"]);
}

#[test]
fn test_annotated_table_round_trips_through_csv() {
    let mut table = collect_table(extract(fixture("dltins_sample.xml")).unwrap()).unwrap();
    annotate(&mut table).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("final.csv");
    table.write_csv_file(&path).unwrap();

    assert_eq!(firds_common::Table::read_csv(&path).unwrap(), table);
}
