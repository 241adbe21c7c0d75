mod config;

use std::sync::Arc;

use clap::Parser;
use pack_formats_lib::template::{CommitContext, render};
use pack_formats_lib::{
    ActionOutputs, GitHubPublisher, HttpResolver, MappingStore, OutputError,
    PublishError, PublishRequest, Publisher, StoreError, Supervisor, TerminationCause, UpdateError,
    UpdateReport, fetch::http_client, update,
};
use reqwest::Client;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{Cli, PublishSettings, Settings};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("failed to publish: {0}")]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("no repository to publish to; set --repository or GITHUB_REPOSITORY")]
    MissingRepository,
}

/// Initialize tracing with the given verbosity level.
///
/// `RUST_LOG` wins when set. Otherwise the per-version progress lines are
/// shown at the default level, and `RUNNER_DEBUG=1` (step debug logging in
/// Actions) behaves like `-vv`.
fn init_tracing(verbose: u8, json: bool) {
    let verbose = if std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1") {
        verbose.max(2)
    } else {
        verbose
    };

    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) if !filter.is_empty() => filter,
        _ => match verbose {
            0 => "warn,pack_formats_lib=info,pack_formats=info".to_string(),
            1 => "info".to_string(),
            2 => "info,pack_formats_lib=debug,pack_formats=debug".to_string(),
            _ => "debug,pack_formats_lib=trace,pack_formats=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(verbose >= 2)
                    .with_level(true)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);
    let settings = Settings::from_cli(cli);

    // Armed before the mapping is loaded so nothing can mutate it unguarded.
    let supervisor = match Supervisor::arm() {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&settings, &supervisor).await {
        error!("{e}");
        supervisor.terminate(TerminationCause::Fault);
    }
}

async fn run(settings: &Settings, supervisor: &Supervisor) -> Result<(), CliError> {
    let outputs = ActionOutputs::from_env();
    outputs.set("path", settings.output_path.to_string_lossy())?;

    let store = Arc::new(MappingStore::load(&settings.output_path)?);
    supervisor.watch(Arc::clone(&store));

    let client = http_client()?;
    let resolver = HttpResolver::new(client.clone());
    let report = update(&client, &resolver, &store, &settings.update).await?;

    if !report.failed.is_empty() {
        warn!(
            "{} versions could not be resolved and will be retried next run: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }

    if report.did_update() {
        outputs.set("new_versions", report.added.join(","))?;
        if let Some(publish) = &settings.publish {
            publish_update(client, settings, publish, &report).await?;
        }
    } else {
        info!("No new versions");
    }

    outputs.set("did_update", report.did_update().to_string())?;
    Ok(())
}

async fn publish_update(
    client: Client,
    settings: &Settings,
    publish: &PublishSettings,
    report: &UpdateReport,
) -> Result<(), CliError> {
    let Some(token) = &publish.token else {
        warn!("Committing is enabled but no GitHub token is set; skipping pull request");
        return Ok(());
    };
    let repository = publish
        .repository
        .as_deref()
        .ok_or(CliError::MissingRepository)?;

    let context = CommitContext {
        kind: publish.commit_type.clone(),
        scope: publish.commit_scope.clone(),
        versions: report.added.clone(),
    };
    let request = PublishRequest {
        mapping_path: settings.output_path.clone(),
        repo_path: settings.repo_path(),
        branch: publish.pr_branch.clone(),
        base: publish.pr_base.clone(),
        commit_message: render(&publish.commit_template, &context),
        versions: report.added.clone(),
        auto_merge: publish.auto_merge,
    };

    let publisher = GitHubPublisher::new(client, &publish.api_url, token, repository)?;
    let outcome = publisher.publish(&request).await?;
    info!(
        "Pull request #{} {}{}",
        outcome.pr_number,
        if outcome.created { "opened" } else { "updated" },
        if outcome.auto_merge { " with auto-merge" } else { "" }
    );
    Ok(())
}
