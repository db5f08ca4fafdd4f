//! Secrets output file.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

use crate::error::{SidecarError, SidecarResult};
use crate::fetcher::FetchedSecrets;

/// Write `{key: data}` for every fetched secret to `path`.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub async fn write_secrets(path: &Path, secrets: &FetchedSecrets) -> SidecarResult<()> {
    let document: Map<String, Value> = secrets
        .records
        .iter()
        .map(|(key, record)| (key.clone(), Value::Object(record.data.clone())))
        .collect();

    let bytes = serde_json::to_vec_pretty(&document)?;
    write_private_file(path, &bytes)
        .await
        .map_err(|source| SidecarError::Output {
            path: path.display().to_string(),
            source,
        })?;

    info!(path = %path.display(), count = document.len(), "Wrote secrets");
    Ok(())
}

/// Replace `path` with `bytes` via a sibling temp file, readable by the
/// owner only.
pub(crate) async fn write_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_private_file_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_private_file(&path, b"first").await.unwrap();
        write_private_file(&path, b"second").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");
        assert!(!dir.path().join("out.json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_private_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_private_file(&path, b"{}").await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
