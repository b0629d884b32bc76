use std::{
    ffi::OsString,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};
use tracing::trace;

/// Every data file is guarded by a sibling `.lock` file. The data file itself is replaced by
/// rename, so it can't carry the lock.
fn lock_path(path: &Path) -> PathBuf {
    with_suffix(path, ".lock")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(Into::into).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

async fn open_lock(path: &Path) -> Result<File, io::Error> {
    File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path(path))
        .await
}

/// Reads a whole file under a shared lock. A missing file is `None`, not an error.
pub async fn read_optional(path: &Path) -> Result<Option<String>, io::Error> {
    if let Some(parent) = path.parent() {
        if !fs::try_exists(parent).await? {
            return Ok(None);
        }
    }

    let lock = open_lock(path).await?;
    lock.lock_shared()?;
    let result = match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    };
    lock.unlock_async().await?;
    result
}

/// Replaces the file contents so that readers observe either the old or the new document,
/// never a partial write.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let lock = open_lock(path).await?;
    lock.lock_exclusive()?;
    let result = replace(path, contents).await;
    lock.unlock_async().await?;
    result
}

async fn replace(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let staging = with_suffix(path, ".tmp");
    let mut file = File::create(&staging).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&staging, path).await?;
    trace!("Replaced {path:?} ({} bytes)", contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{read_optional, write_atomically};

    #[tokio::test]
    async fn missing_file_reads_as_none() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(read_optional(&dir.path().join("absent.json")).await?, None);
        assert_eq!(
            read_optional(&dir.path().join("no-dir").join("absent.json")).await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn write_replaces_contents() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("data.json");

        write_atomically(&path, b"{\"first\": true}").await?;
        write_atomically(&path, b"{}").await?;

        assert_eq!(read_optional(&path).await?.as_deref(), Some("{}"));
        assert!(!dir.path().join("nested").join("data.json.tmp").exists());
        Ok(())
    }
}
