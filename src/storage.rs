use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

/// Where uploaded profile images live. Local disk in production; the trait
/// seam keeps handlers testable without touching the filesystem layout.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store an upload, returning the public URL path (`/uploads/...`).
    /// Byte-identical content is deduplicated against existing uploads.
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String>;
    /// Remove a previously stored upload. Missing files are not an error.
    async fn delete(&self, image_path: &str) -> anyhow::Result<()>;
}

pub struct LocalImageStore {
    dir: PathBuf,
}

impl LocalImageStore {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create upload dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Scan stored uploads for one with exactly these bytes.
    async fn find_duplicate(&self, body: &Bytes) -> anyhow::Result<Option<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.context("read upload dir")?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() || meta.len() != body.len() as u64 {
                continue;
            }
            let existing = tokio::fs::read(entry.path()).await?;
            if existing == body.as_ref() {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        let ext = ext_from_mime(content_type).unwrap_or("bin");

        // Land the upload in a dot-prefixed temp file first so a concurrent
        // dedup scan never reads a half-written upload.
        let tmp = self.dir.join(format!(".incoming-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("write temp upload {}", tmp.display()))?;

        if let Some(existing) = self.find_duplicate(&body).await? {
            tokio::fs::remove_file(&tmp).await.ok();
            return Ok(format!("/uploads/{existing}"));
        }

        let name = format!("{}.{ext}", Uuid::new_v4());
        tokio::fs::rename(&tmp, self.dir.join(&name))
            .await
            .context("publish upload")?;
        Ok(format!("/uploads/{name}"))
    }

    async fn delete(&self, image_path: &str) -> anyhow::Result<()> {
        // Only the final path component is honored; image_path comes from
        // our own database but stays untrusted against traversal anyway.
        let Some(name) = Path::new(image_path).file_name() else {
            return Ok(());
        };
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("delete upload"),
        }
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
