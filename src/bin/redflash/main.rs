//! redflash - progressive path tracer.
//!
//! Interactive by default; `--file` renders offline and writes one image.

use std::process::ExitCode;

use anyhow::{Context, Result};

use redflash::accumulation::{run_batch, BatchPlan, Clock, SystemClock};
use redflash::backend::CpuBackend;
use redflash::config::{self, Command, RenderConfig};
use redflash::output::{self, ImageWriter};
use redflash::scene::{AssetResolver, ObjImporter, SceneSpec};
use redflash::session::RenderSession;

fn main() -> ExitCode {
    // Batch time budgets count from process start
    let clock = SystemClock::new();

    let program = std::env::args().next().unwrap_or_else(|| "redflash".to_string());
    let config = match config::parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            println!("{}", config::usage(&program));
            return ExitCode::SUCCESS;
        }
        Ok(Command::Run(config)) => config,
        Err(e) => {
            eprintln!("Error: {e}\n");
            eprintln!("{}", config::usage(&program));
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = redflash::logging::init();
    log::info!(
        "redflash {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("REDFLASH_BUILD_DATE"),
        env!("REDFLASH_BUILD_TIME")
    );

    match run(&config, &clock) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if is_configuration(&e) {
                eprintln!("\n{}", config::usage(&program));
            }
            ExitCode::FAILURE
        }
    }
}

/// Configuration errors get the usage text, like bad flags do.
fn is_configuration(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<redflash::Error>())
        .any(redflash::Error::is_configuration)
}

fn run(config: &RenderConfig, clock: &dyn Clock) -> Result<()> {
    if let Some(path) = &config.output {
        output::output_format(path)?;
    }
    let spec = match &config.scene {
        Some(path) => SceneSpec::load(path).with_context(|| format!("loading scene {}", path.display()))?,
        None => SceneSpec::default_scene(),
    };
    let resolver = AssetResolver::from_env()?;

    let mut session = RenderSession::new(
        CpuBackend::new(),
        &spec,
        config.width,
        config.height,
        &ObjImporter,
        &resolver,
    )
    .context("scene setup failed")?;
    log::info!(
        "scene: {} instance(s), {} light(s)",
        session.scene().instance_count(),
        session.lights().len()
    );

    match &config.output {
        Some(path) => {
            let plan = match config.time_limit {
                Some(secs) => BatchPlan::timed(secs),
                None => BatchPlan::samples(config.samples),
            };
            let report = run_batch(&mut session, &plan, clock, &mut ImageWriter::new(), path)?;
            if report.stopped_early {
                log::info!("stopped by time budget after {} sample(s)", report.samples);
            }
            Ok(())
        }
        None => run_interactive(session, config),
    }
}

#[cfg(feature = "viewer")]
fn run_interactive(session: RenderSession<CpuBackend>, config: &RenderConfig) -> Result<()> {
    redflash::viewer::run(session, config)
}

#[cfg(not(feature = "viewer"))]
fn run_interactive(_session: RenderSession<CpuBackend>, _config: &RenderConfig) -> Result<()> {
    anyhow::bail!("Viewer not available. Rebuild with --features viewer, or pass --file to render offline")
}
