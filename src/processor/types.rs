use crate::item::ResultRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractIn {
    pub cmd: String,
    pub input_pdf: String,
    pub out_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOut {
    pub ok: bool,
    #[serde(default)]
    pub pages: u64,
    #[serde(default)]
    pub output_dir: String,
    #[serde(default)]
    pub records: Vec<ResultRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorDiag {
    /// Filled in by the host when the extractor leaves it out.
    #[serde(default)]
    pub python_exe: String,
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub libraries: BTreeMap<String, Option<String>>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
