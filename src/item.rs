use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque identifier for one unit of work, usually a PDF path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Final path component, or the whole id when it has none.
    pub fn display_name(&self) -> &str {
        self.as_path()
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WorkItem {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Fails, handing the path back, when it is not valid UTF-8.
impl TryFrom<PathBuf> for WorkItem {
    type Error = PathBuf;

    fn try_from(p: PathBuf) -> Result<Self, PathBuf> {
        p.into_os_string()
            .into_string()
            .map(Self)
            .map_err(PathBuf::from)
    }
}

/// One row of the output dataset. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub filename: String,
    pub case_number: String,
    pub name: String,
    pub address: String,
    pub source_file: String,
    pub page_number: u32,
}

impl ResultRecord {
    pub const HEADERS: [&'static str; 6] = [
        "filename",
        "case_number",
        "name",
        "address",
        "source_file",
        "page_number",
    ];
}

/// Terminal result of processing a single [`WorkItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success {
        pages: u64,
        location: String,
        records: Vec<ResultRecord>,
    },
    Failure {
        reason: String,
    },
}

impl ItemOutcome {
    pub fn success(pages: u64, location: impl Into<String>, records: Vec<ResultRecord>) -> Self {
        ItemOutcome::Success {
            pages,
            location: location.into(),
            records,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ItemOutcome::Failure {
            reason: reason.into(),
        }
    }
}
