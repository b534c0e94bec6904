use anyhow::{Context, Result};
use std::path::Path;

use crate::platform::common::atomic_write;
use crate::snapshot::SecretSnapshot;

/// Render a snapshot as newline-separated `key=value` lines
pub fn render(snapshot: &SecretSnapshot) -> String {
    snapshot
        .rendered()
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// What a publish actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub env_exported: usize,
    /// Keys that could not be exported as environment variables
    pub env_skipped: Vec<String>,
    pub bytes_written: usize,
}

/// Writes snapshots to the output file and the process environment
#[derive(Debug, Clone)]
pub struct Publisher {
    export_env: bool,
    file_mode: Option<u32>,
}

impl Publisher {
    pub fn new(export_env: bool, file_mode: Option<u32>) -> Self {
        Self {
            export_env,
            file_mode,
        }
    }

    /// Publish a snapshot
    ///
    /// Environment variables are set first, then the file is replaced.
    /// A failed file write does not undo the environment changes.
    pub fn publish(&self, snapshot: &SecretSnapshot, output_path: &Path) -> Result<PublishReport> {
        let mut report = PublishReport::default();

        if self.export_env {
            for (key, value) in snapshot.rendered() {
                if !is_exportable(&key, &value) {
                    tracing::warn!("Skipping environment export for key '{}': not a valid variable", key);
                    report.env_skipped.push(key);
                    continue;
                }

                // SAFETY: the agent runs on a current-thread runtime and the
                // fetch has completed, so nothing reads the environment concurrently.
                unsafe { std::env::set_var(&key, &value) };
                report.env_exported += 1;
            }
        }

        let output = render(snapshot);
        atomic_write(output_path, output.as_bytes(), self.file_mode)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
        report.bytes_written = output.len();

        Ok(report)
    }
}

/// `set_var` panics on these, so they are filtered out up front
fn is_exportable(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains('=') && !key.contains('\0') && !value.contains('\0')
}
