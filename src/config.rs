use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub processor: Processor,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Worker count to use: the configured value, or the capped core count
    /// when `concurrency = 0`.
    pub fn effective_concurrency(&self) -> usize {
        if self.batch.concurrency > 0 {
            self.batch.concurrency
        } else {
            crate::util::default_concurrency(self.batch.max_auto_concurrency)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub concurrency: usize,
    pub max_auto_concurrency: usize,
    pub resume: bool,
    pub checkpoint_every: usize,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            concurrency: 0,
            max_auto_concurrency: 8,
            resume: false,
            checkpoint_every: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub checkpoint: String,
    pub output: String,
    pub report: String,
    pub scripts_dir: String,
    pub split_root: String,
    pub log_file: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            checkpoint: "processing_progress.json".into(),
            output: "pdf_processing_results.csv".into(),
            report: "".into(),
            scripts_dir: "scripts".into(),
            split_root: "".into(),
            log_file: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Inputs {
    pub accept_pattern: String,
    pub expand_directories: bool,
}
impl Default for Inputs {
    fn default() -> Self {
        Self {
            accept_pattern: "(?i)\\.pdf$".into(),
            expand_directories: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Processor {
    pub python_exe: String,
    pub script: String,
    pub item_timeout_seconds: u64,
    pub check_on_start: bool,
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Processor {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            script: "pdf_extract.py".into(),
            item_timeout_seconds: 0,
            check_on_start: true,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub flush_on_checkpoint: bool,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            flush_on_checkpoint: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
    pub pin_scripts_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
            pin_scripts_dir: true,
        }
    }
}
