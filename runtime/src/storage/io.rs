use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

async fn create_parent_dir(path: &Path) -> Result<()> {
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))
}

/// Read back a written mock data file; `None` when it is missing or empty.
pub async fn read_json_file<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => return Ok(None),
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid json in {}", path.display()))?;
    Ok(Some(value))
}

/// Atomically write pretty printed json using a temp file + rename.
pub async fn write_json_file<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

pub async fn write_text_file(path: &Path, contents: &str) -> Result<()> {
    write_atomic(path, contents.as_bytes()).await
}

/// The write is fsync'd before the rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    create_parent_dir(path).await?;

    let tmp_path = temp_path(path);

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;

    fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}
