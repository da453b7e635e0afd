use crate::{config::Config, item::WorkItem};
use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Turn command-line arguments into the ordered work list.
///
/// Directories expand to their matching entries (sorted, not recursive).
/// Anything not matching `inputs.accept_pattern` is skipped with a warning.
pub fn collect_items(cfg: &Config, args: &[PathBuf]) -> Result<Vec<WorkItem>> {
    let accept = Regex::new(&cfg.inputs.accept_pattern)
        .with_context(|| format!("inputs.accept_pattern: {}", cfg.inputs.accept_pattern))?;

    let mut items = Vec::new();
    for arg in args {
        let arg_str = arg.display().to_string();
        if cfg.security.reject_url_inputs && looks_like_url(&arg_str) {
            return Err(anyhow!("URL inputs are disabled: {arg_str}"));
        }

        if arg.is_dir() {
            if !cfg.inputs.expand_directories {
                warn!("'{}' is a directory, skipping...", arg.display());
                continue;
            }
            items.extend(expand_dir(arg, &accept)?.into_iter().filter_map(to_item));
        } else if accept.is_match(&arg_str) {
            items.extend(to_item(arg.clone()));
        } else {
            warn!("'{}' does not match {}, skipping...", arg.display(), accept);
        }
    }
    Ok(items)
}

fn expand_dir(dir: &Path, accept: &Regex) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && accept.is_match(&path.display().to_string()) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn to_item(path: PathBuf) -> Option<WorkItem> {
    WorkItem::try_from(path)
        .inspect_err(|p| warn!("'{}' is not valid UTF-8, skipping...", p.display()))
        .ok()
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
