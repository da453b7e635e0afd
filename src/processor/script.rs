use super::{ItemProcessor, ProcessorFactory, types::*};
use crate::config::Config;
use crate::item::{ItemOutcome, WorkItem};
use anyhow::{Context, Result, anyhow};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DOCTOR_DEADLINE: Duration = Duration::from_secs(60);
const POLL: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct ScriptSettings {
    interpreter: PathBuf,
    script: PathBuf,
    split_root: Option<PathBuf>,
    timeout: Option<Duration>,
    env: BTreeMap<String, String>,
}

/// Hands each worker its own [`ScriptProcessor`]; every item runs in a
/// separate child process.
#[derive(Debug, Clone)]
pub struct ScriptProcessorFactory {
    settings: Arc<ScriptSettings>,
}

impl ScriptProcessorFactory {
    pub fn new(cfg: &Config) -> Result<Self> {
        let scripts_dir = PathBuf::from(&cfg.paths.scripts_dir);
        if cfg.security.pin_scripts_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = scripts_dir
                .canonicalize()
                .with_context(|| format!("canonicalize scripts_dir: {}", scripts_dir.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "scripts_dir is outside cwd while pin_scripts_dir=true: {}",
                    canon.display()
                ));
            }
        }
        let script = scripts_dir.join(&cfg.processor.script);
        if !script.exists() {
            return Err(anyhow!("missing script: {}", script.display()));
        }
        let interpreter = resolve_interpreter(&cfg.processor.python_exe);
        let split_root = if cfg.paths.split_root.is_empty() {
            None
        } else {
            Some(PathBuf::from(&cfg.paths.split_root))
        };
        let timeout = if cfg.processor.item_timeout_seconds > 0 {
            Some(Duration::from_secs(cfg.processor.item_timeout_seconds))
        } else {
            None
        };

        Ok(Self {
            settings: Arc::new(ScriptSettings {
                interpreter,
                script,
                split_root,
                timeout,
                env: cfg.processor.env.clone(),
            }),
        })
    }

    /// Ask the extractor to report its interpreter and library versions.
    pub fn doctor(&self) -> Result<ExtractorDiag> {
        let mut diag: ExtractorDiag = self
            .settings
            .call(&serde_json::json!({"cmd": "doctor"}), Some(DOCTOR_DEADLINE))?;
        if diag.python_exe.is_empty() {
            diag.python_exe = self.settings.interpreter.display().to_string();
        }
        Ok(diag)
    }
}

impl ProcessorFactory for ScriptProcessorFactory {
    type Processor = ScriptProcessor;

    fn create(&self) -> Result<ScriptProcessor> {
        Ok(ScriptProcessor {
            settings: Arc::clone(&self.settings),
        })
    }
}

pub struct ScriptProcessor {
    settings: Arc<ScriptSettings>,
}

impl ScriptProcessor {
    fn out_dir_for(&self, item: &WorkItem) -> Option<String> {
        let root = self.settings.split_root.as_ref()?;
        let stem = item
            .as_path()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(item.as_str());
        Some(root.join(format!("split pdfs {stem}")).display().to_string())
    }
}

impl ItemProcessor for ScriptProcessor {
    fn process(&mut self, item: &WorkItem) -> ItemOutcome {
        let req = ExtractIn {
            cmd: "process".into(),
            input_pdf: item.as_str().to_string(),
            out_dir: self.out_dir_for(item),
        };
        match self.settings.call::<_, ExtractOut>(&req, self.settings.timeout) {
            Ok(out) if out.ok => ItemOutcome::success(out.pages, out.output_dir, out.records),
            Ok(out) => ItemOutcome::failure(
                out.error
                    .unwrap_or_else(|| "extractor reported failure".to_string()),
            ),
            Err(err) => ItemOutcome::failure(format!("{err:#}")),
        }
    }
}

impl ScriptSettings {
    /// One request/response exchange with a fresh extractor child.
    fn call<I: Serialize, O: DeserializeOwned>(
        &self,
        request: &I,
        deadline: Option<Duration>,
    ) -> Result<O> {
        let request = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.interpreter)
            .arg(&self.script)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!(
                    "spawning {} {}",
                    self.interpreter.display(),
                    self.script.display()
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // An extractor that exits without reading is judged by its status.
            match stdin.write_all(&request) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => {
                    return Err(e).with_context(|| "writing extractor request");
                }
                _ => {}
            }
        }

        let output = collect(child, deadline)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(anyhow!("extractor failed ({}): {}", output.status, stderr.trim()));
        }
        if !stderr.trim().is_empty() {
            debug!("extractor stderr: {}", stderr.trim());
        }
        serde_json::from_slice(&output.stdout).with_context(|| "parsing extractor reply")
    }
}

/// "auto" prefers `$PDF_BATCH_PYTHON` when it names an existing file.
fn resolve_interpreter(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        return std::env::var_os("PDF_BATCH_PYTHON")
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from("python3"));
    }
    PathBuf::from(raw)
}

fn collect(mut child: Child, deadline: Option<Duration>) -> Result<Output> {
    let Some(limit) = deadline else {
        return child
            .wait_with_output()
            .with_context(|| "waiting for extractor");
    };

    // Both pipes are drained while polling so a chatty child cannot stall.
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    thread::scope(|scope| {
        let out = scope.spawn(move || drain(stdout.as_mut()));
        let err = scope.spawn(move || drain(stderr.as_mut()));
        let status = wait_until(&mut child, limit);
        let stdout = out.join().map_err(|_| anyhow!("stdout reader panicked"))?;
        let stderr = err.join().map_err(|_| anyhow!("stderr reader panicked"))?;
        match status? {
            Some(status) => Ok(Output {
                status,
                stdout,
                stderr,
            }),
            None => Err(anyhow!(
                "item exceeded timeout ({limit:?}); stderr: {}",
                String::from_utf8_lossy(&stderr).trim()
            )),
        }
    })
}

fn drain(pipe: Option<&mut impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("extractor pipe closed early: {e}");
        }
    }
    buf
}

/// `None` means the deadline passed and the child was killed.
fn wait_until(child: &mut Child, limit: Duration) -> Result<Option<ExitStatus>> {
    let end = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().with_context(|| "polling extractor")? {
            return Ok(Some(status));
        }
        if Instant::now() >= end {
            warn!("extractor still running after {:?}; killing", limit);
            let _ = child.kill();
            child.wait().with_context(|| "reaping extractor")?;
            return Ok(None);
        }
        thread::sleep(POLL);
    }
}
