use std::process::ExitCode;

use motion_compare::backend::{self, ExecutionPlan};
use motion_compare::cli::{CliArgs, CliSources, parse_cli};
use motion_compare::error::AnalysisResult;
use motion_compare::settings::resolve_settings;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    // stdout carries the result artifact, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "motion_compare=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (cli, sources) = parse_cli();
    if cli.list_backends {
        backend::display_available_backends();
        return ExitCode::SUCCESS;
    }

    match run(cli, sources).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: CliArgs, sources: CliSources) -> AnalysisResult<()> {
    let settings = resolve_settings(&cli, &sources)?;
    if let Some(dir) = settings.config_dir.as_ref() {
        tracing::debug!(config_dir = %dir.display(), "loaded configuration");
    }
    let plan = ExecutionPlan::from_settings(settings)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling comparison");
            interrupt.cancel();
        }
    });

    backend::run(plan, &cancel).await
}
