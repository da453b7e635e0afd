use crate::error::{Artifact, BatchError};
use crate::item::ResultRecord;
use crate::util::write_atomic;
use std::collections::BTreeSet;
use std::path::Path;

/// Rows gathered from successful items, in the order outcomes arrived.
///
/// Arrival order is not submission order when more than one worker runs;
/// consumers key rows by `source_file` and `page_number`, not by position.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Vec<ResultRecord>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a dataset written by an earlier run. A missing file yields
    /// an empty aggregator.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let mut reader = csv::Reader::from_path(path).map_err(|e| BatchError::corrupt(path, e))?;

        let headers = reader.headers().map_err(|e| BatchError::corrupt(path, e))?;
        if headers.iter().ne(ResultRecord::HEADERS) {
            return Err(BatchError::corrupt(
                path,
                format!("unexpected header row: {:?}", headers),
            ));
        }

        let records = reader
            .deserialize()
            .collect::<Result<Vec<ResultRecord>, _>>()
            .map_err(|e| BatchError::corrupt(path, e))?;
        Ok(Self { records })
    }

    /// Drop rows whose `source_file` is not in `sources`, returning how many
    /// were removed.
    pub fn retain_sources(&mut self, sources: &BTreeSet<&str>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| sources.contains(r.source_file.as_str()));
        before - self.records.len()
    }

    pub fn add(&mut self, records: impl IntoIterator<Item = ResultRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Write every accumulated row with a header. Does nothing (and creates
    /// no file) when there are no rows.
    pub fn serialize(&self, path: &Path) -> Result<(), BatchError> {
        if self.records.is_empty() {
            return Ok(());
        }
        write_atomic(path, |w| {
            let mut out = csv::Writer::from_writer(w);
            for record in &self.records {
                out.serialize(record)?;
            }
            out.flush()
        })
        .map_err(|e| BatchError::persistence(Artifact::Output, path, e))
    }
}
