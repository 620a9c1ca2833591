use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

/// Append-only log of authentication and admin events. Distinct from the
/// tracing output: this file is what the admin page tails.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one timestamped line. Failures are traced, never fatal.
    pub async fn append(&self, message: &str) {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let line = format!("[{ts}] {message}\n");

        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, path = %self.path.display(), "audit log write failed");
        }
    }

    /// Last `max_lines` lines of the log, for the admin page.
    pub async fn tail(&self, max_lines: usize) -> String {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(_) => return String::new(),
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..]
            .iter()
            .map(|l| l.trim_start())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
