use crate::{
    config::Config,
    coordinator::{BatchCoordinator, BatchOptions, StopFlag},
    inputs::collect_items,
    processor::ScriptProcessorFactory,
    progress::ProgressStore,
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf-batch")]
#[command(about = "Resumable parallel PDF batch splitter (worker pool + checkpointing + CSV)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pdf-batch.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the extractor script and its interpreter are usable.
    Doctor {},
    /// Summarise an existing checkpoint.
    Status {
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Process PDFs (files or directories).
    Run {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Worker count; defaults to min(cores, batch.max_auto_concurrency).
        #[arg(long)]
        workers: Option<usize>,
        /// Skip items already completed or failed in the checkpoint.
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        #[arg(long)]
        checkpoint_every: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also write the run statistics as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<ExitCode> {
    let loaded = match resolve_config_path(args.config.as_deref()) {
        Some(p) => Config::load(&p),
        None => Ok(Config::default()),
    };
    let mut cfg = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            // Default logging so the error still reaches the terminal.
            let _ = init_logging(&args, &Config::default());
            return Err(err);
        }
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg)?;
            doctor(&cfg)
        }
        Command::Status { checkpoint } => {
            let _guard = init_logging(&args, &cfg)?;
            if let Some(p) = checkpoint {
                cfg.paths.checkpoint = p.display().to_string();
            }
            status(&cfg)
        }
        Command::Run {
            inputs,
            workers,
            resume,
            checkpoint,
            checkpoint_every,
            output,
            report,
        } => {
            if let Some(n) = workers {
                cfg.batch.concurrency = *n;
            }
            if *resume {
                cfg.batch.resume = true;
            }
            if let Some(n) = checkpoint_every {
                cfg.batch.checkpoint_every = *n;
            }
            if let Some(p) = checkpoint {
                cfg.paths.checkpoint = p.display().to_string();
            }
            if let Some(p) = output {
                cfg.paths.output = p.display().to_string();
            }
            if let Some(p) = report {
                cfg.paths.report = p.display().to_string();
            }
            let _guard = init_logging(&args, &cfg)?;
            run(&cfg, inputs)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("pdf-batch.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if cfg.logging.write_to_file {
        let path = if cfg.paths.log_file.is_empty() {
            PathBuf::from("pdf-batch.log")
        } else {
            PathBuf::from(&cfg.paths.log_file)
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let file = std::fs::File::create(&path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<ExitCode> {
    let factory = ScriptProcessorFactory::new(cfg)?;
    let diag = factory.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(if diag.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn status(cfg: &Config) -> Result<ExitCode> {
    let store = ProgressStore::new(&cfg.paths.checkpoint);
    let state = store.load()?;
    let failures: Vec<_> = state
        .failed
        .iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "reason": state.reasons.get(id),
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "checkpoint": store.path(),
            "exists": store.path().exists(),
            "completed": state.completed.len(),
            "failed": state.failed.len(),
            "timestamp": state.last_checkpoint,
            "failures": failures,
        }))?
    );
    Ok(ExitCode::SUCCESS)
}

fn run(cfg: &Config, inputs: &[PathBuf]) -> Result<ExitCode> {
    let items = collect_items(cfg, inputs)?;
    if items.is_empty() {
        return Err(anyhow!("no PDF files provided"));
    }
    info!("found {} PDF files to process", items.len());

    let factory = ScriptProcessorFactory::new(cfg)?;
    if cfg.processor.check_on_start {
        let diag = factory.doctor().with_context(|| "extractor doctor check")?;
        if !diag.ok {
            return Err(anyhow!(
                "extractor is not ready: {}",
                diag.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    let coordinator = BatchCoordinator::new(BatchOptions::from_config(cfg), factory);
    install_interrupt(coordinator.stop_flag())?;

    let started = now_rfc3339();
    let stats = coordinator.run(items).with_context(|| "batch run")?;

    if cfg.output.print_summary {
        println!("{stats}");
    }

    if !cfg.paths.report.is_empty() {
        let report = serde_json::json!({
            "started": started,
            "finished": now_rfc3339(),
            "checkpoint": cfg.paths.checkpoint,
            "output": cfg.paths.output,
            "statistics": stats,
        });
        std::fs::write(&cfg.paths.report, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report: {}", cfg.paths.report))?;
    }

    Ok(if stats.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn install_interrupt(stop: StopFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if stop.request() {
            warn!("interrupt received; finishing in-flight items before exit");
        } else {
            warn!("interrupt already requested; waiting for in-flight items");
        }
    })
    .with_context(|| "installing interrupt handler")
}
