#![allow(dead_code)]

use pdf_batch::{BatchOptions, ItemOutcome, ResultRecord, WorkItem};
use std::path::Path;

pub fn items(n: usize) -> Vec<WorkItem> {
    (1..=n).map(|i| WorkItem::new(format!("in/doc-{i:02}.pdf"))).collect()
}

pub fn opts(dir: &Path, concurrency: usize) -> BatchOptions {
    BatchOptions {
        concurrency,
        resume: false,
        checkpoint_path: dir.join("processing_progress.json"),
        output_path: dir.join("pdf_processing_results.csv"),
        checkpoint_every: 10,
        flush_output_on_checkpoint: true,
    }
}

pub fn record(item: &WorkItem, page: u32) -> ResultRecord {
    ResultRecord {
        filename: format!("Case_Number_A-{page}_Page_Num_{page}.pdf"),
        case_number: format!("A-{page}"),
        name: "Jane Applicant".into(),
        address: "1 Main St".into(),
        source_file: item.display_name().to_string(),
        page_number: page,
    }
}

/// One page, one record.
pub fn one_page(item: &WorkItem) -> ItemOutcome {
    ItemOutcome::success(1, format!("split pdfs {}", item.display_name()), vec![record(item, 1)])
}
