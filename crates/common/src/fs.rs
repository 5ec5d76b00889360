use std::path::Path;

use tokio::fs;

/// Atomic write: write a sibling temp file, then rename over the target.
///
/// Readers see either the previous contents or the new ones, never a torn
/// file. Parent directories are created as needed.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}

/// Read a file, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
