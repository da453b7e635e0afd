mod common;

use common::{items, one_page, opts, record};
use pdf_batch::{
    BatchCoordinator, BatchError, ItemOutcome, ProgressState, ProgressStore, WorkItem,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn read_rows(path: &std::path::Path) -> Vec<csv::StringRecord> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap()).collect()
}

#[test]
fn three_failures_out_of_twenty_five() {
    let dir = TempDir::new().unwrap();
    let bad: BTreeSet<WorkItem> = ["in/doc-05.pdf", "in/doc-13.pdf", "in/doc-21.pdf"]
        .into_iter()
        .map(WorkItem::from)
        .collect();
    let bad_for_factory = bad.clone();

    let factory = move || {
        let bad = bad_for_factory.clone();
        move |item: &WorkItem| {
            if bad.contains(item) {
                ItemOutcome::failure("could not open PDF")
            } else {
                one_page(item)
            }
        }
    };
    let stats = BatchCoordinator::new(opts(dir.path(), 4), factory)
        .run(items(25))
        .unwrap();

    assert_eq!(stats.succeeded, 22);
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.total, 25);
    assert_eq!(stats.pages_processed, 22);
    assert!(!stats.is_success());
    assert!(!stats.interrupted);

    let failed_ids: BTreeSet<WorkItem> = stats.failures.iter().map(|f| f.id.clone()).collect();
    assert_eq!(failed_ids, bad);
    assert!(stats.failures.iter().all(|f| f.reason == "could not open PDF"));

    let rows = read_rows(&dir.path().join("pdf_processing_results.csv"));
    assert_eq!(rows.len(), 22);
    for row in &rows {
        let source = &row[4];
        assert!(!bad.iter().any(|b| b.display_name() == source));
    }

    let saved = ProgressStore::new(dir.path().join("processing_progress.json"))
        .load()
        .unwrap();
    assert_eq!(saved.failed, bad);
    assert_eq!(saved.completed.len(), 22);
}

#[test]
fn empty_input_finishes_without_output() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let factory = move || {
        let c = c.clone();
        move |item: &WorkItem| {
            c.fetch_add(1, Ordering::SeqCst);
            one_page(item)
        }
    };

    let stats = BatchCoordinator::new(opts(dir.path(), 4), factory)
        .run(Vec::new())
        .unwrap();

    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, 0);
    assert!(stats.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("pdf_processing_results.csv").exists());
}

#[test]
fn in_flight_never_exceeds_concurrency() {
    for concurrency in [1, 4, 8] {
        let dir = TempDir::new().unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (f, p) = (in_flight.clone(), peak.clone());

        let factory = move || {
            let (f, p) = (f.clone(), p.clone());
            move |item: &WorkItem| {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(15));
                f.fetch_sub(1, Ordering::SeqCst);
                one_page(item)
            }
        };

        let stats = BatchCoordinator::new(opts(dir.path(), concurrency), factory)
            .run(items(24))
            .unwrap();
        assert_eq!(stats.succeeded, 24);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= concurrency, "peak {peak} > {concurrency}");
    }
}

#[test]
fn duplicates_reach_one_terminal_state() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let factory = move || {
        let c = c.clone();
        move |item: &WorkItem| {
            c.fetch_add(1, Ordering::SeqCst);
            one_page(item)
        }
    };

    let mut input = items(6);
    input.extend(items(3));
    let stats = BatchCoordinator::new(opts(dir.path(), 3), factory)
        .run(input)
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 9);
    assert_eq!(stats.processed, 9);
    assert_eq!(stats.succeeded, 6);
    assert_eq!(stats.total, 6);
    assert_eq!(stats.records, 6);
    assert_eq!(read_rows(&dir.path().join("pdf_processing_results.csv")).len(), 6);
}

#[test]
fn panics_and_setup_errors_become_failures() {
    let dir = TempDir::new().unwrap();
    let factory = || {
        |item: &WorkItem| {
            if item.as_str().ends_with("doc-02.pdf") {
                panic!("page tree is cyclic");
            }
            one_page(item)
        }
    };
    let stats = BatchCoordinator::new(opts(dir.path(), 2), factory)
        .run(items(4))
        .unwrap();
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 1);
    assert!(stats.failures[0].reason.contains("page tree is cyclic"));

    struct Broken;
    impl pdf_batch::ProcessorFactory for Broken {
        type Processor = fn(&WorkItem) -> ItemOutcome;
        fn create(&self) -> anyhow::Result<Self::Processor> {
            anyhow::bail!("no scratch space")
        }
    }
    let dir = TempDir::new().unwrap();
    let stats = BatchCoordinator::new(opts(dir.path(), 2), Broken)
        .run(items(3))
        .unwrap();
    assert_eq!(stats.failed, 3);
    assert!(stats.failures.iter().all(|f| f.reason.contains("no scratch space")));
}

#[test]
fn checkpoint_written_every_n_outcomes() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("processing_progress.json");
    let seen_at_eleven = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (seen, c, cp) = (seen_at_eleven.clone(), calls.clone(), checkpoint.clone());

    let factory = move || {
        let (seen, c, cp) = (seen.clone(), c.clone(), cp.clone());
        move |item: &WorkItem| {
            if c.fetch_add(1, Ordering::SeqCst) + 1 == 11 {
                let deadline = Instant::now() + Duration::from_secs(5);
                while Instant::now() < deadline {
                    if let Ok(state) = ProgressStore::new(&cp).load() {
                        if state.completed.len() >= 10 {
                            seen.store(state.completed.len(), Ordering::SeqCst);
                            break;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
            one_page(item)
        }
    };

    BatchCoordinator::new(opts(dir.path(), 1), factory)
        .run(items(15))
        .unwrap();

    assert_eq!(seen_at_eleven.load(Ordering::SeqCst), 10);
    // Rows for checkpointed items were flushed alongside the checkpoint.
    assert_eq!(read_rows(&dir.path().join("pdf_processing_results.csv")).len(), 15);
    let state: ProgressState = ProgressStore::new(&checkpoint).load().unwrap();
    assert_eq!(state.completed.len(), 15);
}

#[test]
fn records_follow_arrival_order() {
    let dir = TempDir::new().unwrap();
    let factory = || {
        |item: &WorkItem| {
            let pages: Vec<_> = (1..=3).map(|p| record(item, p)).collect();
            ItemOutcome::success(3, "out", pages)
        }
    };
    let stats = BatchCoordinator::new(opts(dir.path(), 1), factory)
        .run(items(2))
        .unwrap();
    assert_eq!(stats.records, 6);
    assert_eq!(stats.pages_processed, 6);

    let rows = read_rows(&dir.path().join("pdf_processing_results.csv"));
    let order: Vec<(String, String)> = rows
        .iter()
        .map(|r| (r[4].to_string(), r[5].to_string()))
        .collect();
    let expected: Vec<(String, String)> = [
        ("doc-01.pdf", "1"),
        ("doc-01.pdf", "2"),
        ("doc-01.pdf", "3"),
        ("doc-02.pdf", "1"),
        ("doc-02.pdf", "2"),
        ("doc-02.pdf", "3"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    assert_eq!(order, expected);
}

#[test]
fn zero_concurrency_is_rejected() {
    let dir = TempDir::new().unwrap();
    let factory = || one_page;
    let err = BatchCoordinator::new(opts(dir.path(), 0), factory)
        .run(items(1))
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidConfig(_)));

    let mut o = opts(dir.path(), 2);
    o.checkpoint_every = 0;
    let err = BatchCoordinator::new(o, factory).run(items(1)).unwrap_err();
    assert!(matches!(err, BatchError::InvalidConfig(_)));
}
