// Entry point: run every task against every configured backend

mod backends;
mod config;
mod logging;
mod tasks;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use venue_agent::{BrowserLauncher, CsvStoreFactory, HttpLauncher, TaskRunner};

use crate::config::{BrowserKind, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so it can supply option values
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logging::init(cli.log_format);
    tracing::info!("Starting venue agent");

    let tasks = tasks::load_tasks(&cli.tasks).await?;
    tracing::info!(tasks = tasks.len(), file = %cli.tasks.display(), "Tasks loaded");

    let registry = backends::register_backends(&cli.tokens, &cli.models);
    if registry.is_empty() {
        bail!(
            "No backend configured: set at least one of CHATGPTTOKEN, CLAUDETOKEN, \
             MISTRALTOKEN, TOGETHERAITOKEN, JAMBATOKEN or GCLOUDPROJECTID with GCLOUDACCESSTOKEN"
        );
    }

    let launcher = browser_launcher(&cli).context("Failed to set up browser")?;
    let stores = Arc::new(CsvStoreFactory::new(&cli.output_dir));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let runner = TaskRunner::new(launcher, stores)
        .with_config(cli.driver_config())
        .with_cancellation(cancel);

    if let Err(e) = runner.run(registry.into_backends(), tasks).await {
        for worker in &e.workers {
            for failure in &worker.failures {
                tracing::error!(backend = %worker.backend, "{}", failure);
            }
        }
        bail!("Run finished with {} failure(s)", e.failure_count());
    }

    tracing::info!(output_dir = %cli.output_dir.display(), "All tasks processed");
    Ok(())
}

fn browser_launcher(cli: &Cli) -> Result<Arc<dyn BrowserLauncher>> {
    let options = cli.browser_options();
    match cli.browser {
        BrowserKind::Http => Ok(Arc::new(HttpLauncher::new(options))),
        #[cfg(feature = "chromium")]
        BrowserKind::Chromium => {
            let launcher = venue_agent::ChromiumLauncher::new(options);
            Ok(Arc::new(match &cli.chromium_path {
                Some(path) => launcher.with_executable(path),
                None => launcher,
            }))
        }
        #[cfg(not(feature = "chromium"))]
        BrowserKind::Chromium => bail!("Chromium support not compiled in; rebuild with --features chromium"),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::warn!("Interrupted, finishing in-flight work and saving results");
            cancel.cancel();
        }
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
