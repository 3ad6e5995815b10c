use crate::error::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Bumped whenever the layout of a snapshot changes; older caches are treated
/// as missing and rebuilt.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub version: u32,
    pub created_at: String,
    pub num_docs: u32,
}

impl SnapshotHeader {
    pub fn new(num_docs: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "".into()),
            num_docs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn index(&self) -> PathBuf { self.root.join("index.bin") }
    pub fn chunks(&self) -> PathBuf { self.root.join("chunks.bin") }
}

impl Default for IndexPaths {
    fn default() -> Self { Self::new("cache") }
}

/// Serialize `value` into `path` through a sibling temp file and a rename, so a
/// concurrent reader sees either the previous snapshot or the new one.
pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let bytes = bincode::serialize(value)?;
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{seq}.tmp", std::process::id()));
    {
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

/// Read a snapshot written by [`save_snapshot`]. Any failure to open or decode
/// the file is reported as [`SearchError::CacheMissing`].
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut f = File::open(path)
        .map_err(|e| SearchError::CacheMissing(format!("{}: {e}", path.display())))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)
        .map_err(|e| SearchError::CacheMissing(format!("{}: {e}", path.display())))?;
    bincode::deserialize(&buf)
        .map_err(|e| SearchError::CacheMissing(format!("{} is unreadable: {e}", path.display())))
}

pub fn check_header(path: &Path, header: &SnapshotHeader) -> Result<()> {
    if header.version != FORMAT_VERSION {
        return Err(SearchError::CacheMissing(format!(
            "{} has format version {}, expected {}",
            path.display(),
            header.version,
            FORMAT_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_cache_missing() {
        let dir = tempdir().unwrap();
        let err = load_snapshot::<Vec<u32>>(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, SearchError::CacheMissing(_)));
    }

    #[test]
    fn garbage_is_cache_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"\x01").unwrap();
        let err = load_snapshot::<(SnapshotHeader, Vec<String>)>(&path).unwrap_err();
        assert!(matches!(err, SearchError::CacheMissing(_)));
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("index.bin");
        save_snapshot(&path, &vec![1u32, 2, 3]).unwrap();
        assert!(path.exists());
        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        let back: Vec<u32> = load_snapshot(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn stale_version_rejected() {
        let mut header = SnapshotHeader::new(3);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(check_header(Path::new("x"), &header), Err(SearchError::CacheMissing(_))));
    }
}
