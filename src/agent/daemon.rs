use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::detect::{describe_change, has_changed};
use super::provider::SecretProvider;
use super::publisher::{PublishReport, Publisher};
use super::scheduler::PollingScheduler;
use crate::snapshot::SecretSnapshot;

/// Result of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    FetchFailed,
    Unchanged,
    Published,
    PublishFailed,
}

/// What the loop remembers between ticks
#[derive(Debug, Default)]
pub struct LoopState {
    last_known: Option<SecretSnapshot>,
}

impl LoopState {
    pub fn last_known(&self) -> Option<&SecretSnapshot> {
        self.last_known.as_ref()
    }

    pub fn last_known_version(&self) -> Option<&str> {
        self.last_known.as_ref().map(|s| s.version())
    }
}

/// Poll, compare, publish, sleep
pub struct SyncLoop<P> {
    provider: P,
    publisher: Publisher,
    scheduler: PollingScheduler,
    secret_path: String,
    output_file: PathBuf,
    state: LoopState,
}

impl<P: SecretProvider> SyncLoop<P> {
    pub fn new(
        provider: P,
        publisher: Publisher,
        scheduler: PollingScheduler,
        secret_path: impl Into<String>,
        output_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            publisher,
            scheduler,
            secret_path: secret_path.into(),
            output_file: output_file.into(),
            state: LoopState::default(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run until `cancel` fires
    ///
    /// Cancellation is checked before each tick and during the sleep. A
    /// fetch or publish that has already started runs to completion.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        tracing::info!("Starting sync loop");
        tracing::info!("Secret path: {}", self.secret_path);
        tracing::info!("Output file: {}", self.output_file.display());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = self.tick().await;

            let delay = self.scheduler.next_delay(outcome == TickOutcome::FetchFailed);
            let next_check = self.scheduler.next_poll_time(delay);
            tracing::debug!("Next check at: {}", next_check.format("%Y-%m-%d %H:%M:%S %Z"));

            if !self.scheduler.sleep_or_cancel(delay, cancel).await {
                break;
            }
        }

        tracing::info!("Gracefully shutting down");
    }

    /// One poll. Errors are logged and folded into the outcome.
    pub async fn tick(&mut self) -> TickOutcome {
        tracing::info!("Checking for secret updates...");

        let snapshot = match self.provider.fetch_secret(&self.secret_path).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Unable to get secret: {:#}", e);
                return TickOutcome::FetchFailed;
            }
        };

        if !has_changed(self.state.last_known(), &snapshot) {
            tracing::info!("No secret updates detected");
            return TickOutcome::Unchanged;
        }

        match self.publish(snapshot) {
            Ok(_) => TickOutcome::Published,
            Err(e) => {
                tracing::error!("{:#}", e);
                TickOutcome::PublishFailed
            }
        }
    }

    /// One poll that reports failures as errors instead of logging them
    pub async fn check_once(&mut self) -> Result<TickOutcome> {
        let snapshot = self
            .provider
            .fetch_secret(&self.secret_path)
            .await
            .context("Unable to get secret")?;

        if !has_changed(self.state.last_known(), &snapshot) {
            return Ok(TickOutcome::Unchanged);
        }

        self.publish(snapshot)?;
        Ok(TickOutcome::Published)
    }

    /// Publish and remember the snapshot
    ///
    /// The snapshot becomes `last_known` even when publishing fails, so a
    /// transient write fault does not cause a republish on every tick.
    fn publish(&mut self, snapshot: SecretSnapshot) -> Result<PublishReport> {
        let fingerprint = snapshot.fingerprint();
        tracing::info!(
            "New secret version detected: {} ({}, {} keys, {}...)",
            snapshot.version(),
            describe_change(self.state.last_known(), &snapshot),
            snapshot.len(),
            &fingerprint[..19]
        );

        if snapshot.is_empty() {
            tracing::warn!("Secret has no keys, output file will be empty");
        }

        let result = self.publisher.publish(&snapshot, &self.output_file);
        self.state.last_known = Some(snapshot);

        let report = result?;
        if !report.env_skipped.is_empty() {
            tracing::warn!(
                "{} keys were not exported to the environment",
                report.env_skipped.len()
            );
        }
        tracing::info!(
            "Successfully updated secret file: {} ({} bytes, {} env vars)",
            self.output_file.display(),
            report.bytes_written,
            report.env_exported
        );

        Ok(report)
    }
}
