//! `capgen-run` -- headless front end for one caption-generation job.
//!
//! Assembles a job from environment variables, starts it on the
//! backend, prints the progress transcript as it streams in, and
//! cancels the job on Ctrl-C.
//!
//! Setting `CAPGEN_UPLOAD_FILE` selects the upload path; otherwise every
//! folder under `CAPGEN_PARENT_DIR` is processed. See
//! [`JobSettings::from_env`] for the full variable list.
//!
//! Exit status: `0` completed, `1` failed, `2` invalid input, `130`
//! cancelled.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use capgen_client::api::HttpBackend;
use capgen_client::config::{content_type_for, ClientConfig, JobSettings};
use capgen_client::error::JobError;
use capgen_client::events::JobNotice;
use capgen_client::runner::JobRunner;
use capgen_core::error::ValidationError;
use capgen_core::job::{JobConfig, JobSource, JobState, ResultBundle, UploadedAsset};
use capgen_core::transcript::LineClass;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capgen_client=info,capgen_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(JobState::Completed) => ExitCode::SUCCESS,
        Ok(JobState::Cancelled) => ExitCode::from(130),
        Ok(_) => ExitCode::FAILURE,
        Err(e) if e.downcast_ref::<ValidationError>().is_some() => {
            eprintln!("Invalid job settings: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "capgen-run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<JobState> {
    let client_config = ClientConfig::from_env()?;
    let settings = JobSettings::from_env()?;

    tracing::info!(
        api_url = %client_config.api_url,
        path = ?settings.path(),
        "Starting capgen-run",
    );

    let backend = Arc::new(HttpBackend::new(
        client_config.api_url.clone(),
        client_config.request_timeout,
    ));

    let mut form = settings.form.clone();
    if let Some(path) = &settings.upload_file {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let mut asset = UploadedAsset::new(file_name, bytes);
        if let Some(content_type) = content_type_for(path) {
            asset = asset.with_content_type(content_type);
        }
        form.asset = Some(asset);
    }

    let config = match backend.assemble_job(&form, settings.path()).await {
        Ok(config) => config,
        Err(JobError::Validation(e)) => return Err(e.into()),
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to list templates")),
    };
    tracing::debug!(?config, "Job configuration assembled");

    let mut runner = JobRunner::new(backend.clone());
    let printer = tokio::spawn(print_notices(runner.subscribe()));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling job");
            ctrl_c.cancel();
        }
    });

    runner.start(&config).await?;
    let state = runner.drive(&cancel).await;
    let result = runner.result().cloned();

    let pending = runner.pending_cleanups();
    if pending > 0 {
        tracing::info!(pending, "Waiting for temp resource cleanup");
    }
    runner.wait_for_cleanup().await;
    drop(runner);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Transcript printer stopped abnormally");
    }

    if state == JobState::Completed {
        match result {
            Some(bundle) => print_bundle(&bundle),
            None => print_folders(&backend, &config).await,
        }
    }

    Ok(state)
}

/// Print transcript lines until the runner goes away.
async fn print_notices(mut notices: broadcast::Receiver<JobNotice>) {
    loop {
        match notices.recv().await {
            Ok(JobNotice::Line { line }) => match line.class {
                LineClass::Error => eprintln!("{}", line.text),
                LineClass::Success | LineClass::Neutral => println!("{}", line.text),
            },
            Ok(JobNotice::StartRejected { reason }) => eprintln!("{reason}"),
            Ok(JobNotice::StateChanged { .. } | JobNotice::ControlsReset { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Transcript printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_bundle(bundle: &ResultBundle) {
    println!();
    println!("Images:");
    for image in &bundle.images {
        println!("  {} ({} bytes inline)", image.name, image.inline_data_uri.len());
    }
    match serde_json::to_string_pretty(&bundle.structured_output) {
        Ok(json) => println!("Structured output:\n{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to render structured output"),
    }
}

/// Existing-folder jobs write results in place; re-list the folders to
/// show what was processed.
async fn print_folders(backend: &HttpBackend, config: &JobConfig) {
    let JobSource::Existing { source_path } = &config.source else {
        return;
    };
    match backend.list_folders(source_path).await {
        Ok(folders) => {
            println!();
            for folder in folders {
                let status = if folder.has_output {
                    "output available"
                } else {
                    "not processed"
                };
                println!("  {} ({} images): {status}", folder.uid, folder.image_count);
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to list folders after completion"),
    }
}
