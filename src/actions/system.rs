//! Filesystem operations.

use std::path::Path;

use serde_json::{Value, json};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, require_str};

pub async fn handle(
    cancel: &CancellationToken,
    operation: &str,
    payload: &Payload,
) -> Result<Option<ActionOutput>> {
    let path = require_str(payload, "path")?;

    if cancel.is_cancelled() {
        return Err(StewardError::Cancelled);
    }

    match operation {
        "create_file" => {
            fs::File::create(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not create file: {e}")))?;
            Ok(None)
        }
        "delete_file" => {
            fs::remove_file(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not delete file: {e}")))?;
            Ok(None)
        }
        "create_folder" => {
            fs::create_dir_all(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not create folder: {e}")))?;
            Ok(None)
        }
        "delete_folder" => {
            fs::remove_dir_all(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not delete folder: {e}")))?;
            Ok(None)
        }
        "write_file" => {
            let content = require_str(payload, "content")?;
            append_file(path, content).await?;
            Ok(None)
        }
        "write_file_atomic" => {
            let content = require_str(payload, "content")?;
            write_file_atomic(path, content).await?;
            Ok(None)
        }
        "read_file" => {
            let content = fs::read_to_string(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not read file: {e}")))?;
            Ok(Some(output(json!({"content": content}))))
        }
        "list_directory" => {
            let mut entries = fs::read_dir(path)
                .await
                .map_err(|e| StewardError::Other(format!("could not list directory: {e}")))?;
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            Ok(Some(output(json!({"entries": names}))))
        }
        other => Err(StewardError::Other(format!(
            "unknown system operation: {other}"
        ))),
    }
}

async fn append_file(path: &str, content: &str) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| StewardError::Other(format!("could not open file for writing: {e}")))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| StewardError::Other(format!("could not write to file: {e}")))?;
    file.flush()
        .await
        .map_err(|e| StewardError::Other(format!("could not write to file: {e}")))?;
    Ok(())
}

/// Temp file in the destination directory, then rename over the target.
async fn write_file_atomic(path: &str, content: &str) -> Result<()> {
    let target = Path::new(path);
    let dir = target.parent().filter(|p| !p.as_os_str().is_empty());
    let base = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let tmp_path = match dir {
        Some(dir) => dir.join(format!(".{base}.tmp-{}", std::process::id())),
        None => format!(".{base}.tmp-{}", std::process::id()).into(),
    };

    fs::write(&tmp_path, content)
        .await
        .map_err(|e| StewardError::Other(format!("atomic: write: {e}")))?;
    if let Err(e) = fs::rename(&tmp_path, target).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StewardError::Other(format!("atomic: rename: {e}")));
    }
    Ok(())
}

fn output(value: Value) -> ActionOutput {
    value.as_object().cloned().unwrap_or_default()
}
