use pdf_batch::{BatchError, ResultAggregator, ResultRecord};
use tempfile::TempDir;

fn rec(source: &str, page: u32) -> ResultRecord {
    ResultRecord {
        filename: format!("Case_Number_UNKNOWN_Page_Num_{page}.pdf"),
        case_number: "UNKNOWN".into(),
        name: "Acme, Inc.".into(),
        address: "\"Unit 4\" Harbor Rd".into(),
        source_file: source.into(),
        page_number: page,
    }
}

#[test]
fn empty_aggregator_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    ResultAggregator::new().serialize(&path).unwrap();
    assert!(!path.exists());
}

#[test]
fn one_row_per_record_with_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let mut agg = ResultAggregator::new();
    agg.add(vec![rec("a.pdf", 1), rec("a.pdf", 2)]);
    agg.add(vec![rec("b.pdf", 1)]);
    agg.serialize(&path).unwrap();

    let mut rdr = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ResultRecord::HEADERS);
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[0][2], "Acme, Inc.");
    assert_eq!(&rows[2][4], "b.pdf");
}

#[test]
fn reload_keeps_previous_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let mut agg = ResultAggregator::new();
    agg.add(vec![rec("a.pdf", 1), rec("a.pdf", 2)]);
    agg.serialize(&path).unwrap();

    let mut again = ResultAggregator::load(&path).unwrap();
    assert_eq!(again.records(), agg.records());
    again.add(vec![rec("b.pdf", 1)]);
    again.serialize(&path).unwrap();
    assert_eq!(ResultAggregator::load(&path).unwrap().len(), 3);
}

#[test]
fn load_missing_is_empty_and_wrong_schema_is_corrupt() {
    let dir = TempDir::new().unwrap();
    assert!(ResultAggregator::load(&dir.path().join("none.csv")).unwrap().is_empty());

    let path = dir.path().join("other.csv");
    std::fs::write(&path, "id,value\n1,2\n").unwrap();
    let err = ResultAggregator::load(&path).unwrap_err();
    assert!(matches!(err, BatchError::CorruptState { .. }));
}

#[test]
fn retain_sources_drops_rows_of_other_items() {
    let mut agg = ResultAggregator::new();
    agg.add(vec![rec("a.pdf", 1), rec("b.pdf", 1), rec("a.pdf", 2)]);
    let keep: std::collections::BTreeSet<&str> = ["a.pdf"].into_iter().collect();
    assert_eq!(agg.retain_sources(&keep), 1);
    assert!(agg.records().iter().all(|r| r.source_file == "a.pdf"));
    assert_eq!(agg.len(), 2);
}
