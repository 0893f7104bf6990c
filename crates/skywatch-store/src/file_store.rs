//! Durable storage for bucket files.
//!
//! # Atomic writes
//!
//! Every save writes a [`NamedTempFile`] in the history directory, fsyncs
//! it, then persists (renames) it over the target. Rename is atomic on the same filesystem, so a
//! reader (or a crash) sees either the old file or the new one, never a
//! half-written array.
//!
//! # Empty arrays are never written
//!
//! Saving an empty slice is a no-op. A bucket only ever gains sessions,
//! so an empty write can only come from a bug upstream and would wipe a
//! week of history.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use skywatch_protocol::{Codec, FlightSession, JsonCodec};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, trace};

use crate::{StoreError, WeekBucket};

/// Reads and writes bucket files inside one history directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    codec: JsonCodec,
}

impl FileStore {
    /// A store rooted at `root`. The directory is created lazily on the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            codec: JsonCodec,
        }
    }

    /// The history directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a bucket file. Rejects names that would escape
    /// the history directory.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf, StoreError> {
        let escapes = filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\']);
        if escapes {
            return Err(StoreError::InvalidFilename(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }

    /// Loads the sessions stored in `filename`.
    ///
    /// A missing file (or one containing only whitespace) is an empty
    /// bucket.
    ///
    /// # Errors
    /// - [`StoreError::CorruptData`] if the file exists but doesn't parse.
    /// - [`StoreError::Io`] on any other read failure.
    pub async fn load(&self, filename: &str) -> Result<Vec<FlightSession>, StoreError> {
        let path = self.path_for(filename)?;

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "bucket file absent, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io("failed to read", path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        self.codec
            .decode(&bytes)
            .map_err(|source| StoreError::CorruptData { path, source })
    }

    /// Atomically replaces `filename` with `sessions`.
    ///
    /// Returns `false` (and touches nothing) when `sessions` is empty.
    ///
    /// # Errors
    /// [`StoreError::Io`] if creating the directory or the temp file
    /// fails, or if writing, syncing or persisting it does. The previous
    /// file is left intact.
    pub async fn save(&self, filename: &str, sessions: &[FlightSession]) -> Result<bool, StoreError> {
        let path = self.path_for(filename)?;

        if sessions.is_empty() {
            debug!(%filename, "refusing to write an empty bucket");
            return Ok(false);
        }

        let bytes = self
            .codec
            .encode(&sessions)
            .map_err(|source| StoreError::Encode {
                path: path.clone(),
                source,
            })?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io("failed to create history dir", &self.root, e))?;

        let root = self.root.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&root, &target, &bytes))
            .await
            .map_err(|e| StoreError::io("write task failed for", &path, std::io::Error::other(e)))??;

        trace!(%filename, sessions = sessions.len(), "bucket written");
        Ok(true)
    }

    /// Lists the bucket files present in the history directory, oldest
    /// week first. Anything that isn't a canonical bucket name (temp
    /// files, stray notes) is ignored.
    pub async fn list_buckets(&self) -> Result<Vec<WeekBucket>, StoreError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("failed to list", &self.root, e)),
        };

        let mut buckets = Vec::new();
        loop {
            let entry = dir
                .next_entry()
                .await
                .map_err(|e| StoreError::io("failed to list", &self.root, e))?;
            let Some(entry) = entry else { break };
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(bucket) = WeekBucket::from_filename(name) {
                    buckets.push(bucket);
                }
            }
        }

        buckets.sort_by_key(|b| b.start);
        Ok(buckets)
    }
}

/// Blocking half of [`FileStore::save`]. The temp file is deleted when
/// it is dropped, so a failure before `persist` leaves nothing behind.
fn atomic_write(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::io("failed to create temp file in", dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| StoreError::io("failed to write temp file for", path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io("failed to sync temp file for", path, e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io("failed to persist temp file to", path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use skywatch_protocol::{DroneId, SessionState, TracePoint};
    use tempfile::TempDir;

    use super::*;

    fn session(id: &str) -> FlightSession {
        let created = Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap();
        let mut s = FlightSession::new(DroneId::new(id), created, SessionState::Live);
        s.trace.push(TracePoint::new(48.85, 2.35));
        s
    }

    const NAME: &str = "flights_2024-03-03_2024-03-09.json";

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load(NAME).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_returns_same_sessions() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested/history"));

        let sessions = vec![session("D1"), session("D2")];
        assert!(store.save(NAME, &sessions).await.unwrap());

        assert_eq!(store.load(NAME).await.unwrap(), sessions);
    }

    #[tokio::test]
    async fn test_save_empty_never_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.save(NAME, &[session("D1")]).await.unwrap();

        assert!(!store.save(NAME, &[]).await.unwrap());

        assert_eq!(store.load(NAME).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_empty_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.save(NAME, &[]).await.unwrap();
        assert!(!dir.path().join(NAME).exists());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.save(NAME, &[session("D1")]).await.unwrap();
        store.save(NAME, &[session("D1"), session("D2")]).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_save_failed_persist_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        // A directory in the way makes the final rename fail.
        std::fs::create_dir(dir.path().join(NAME)).unwrap();
        let store = FileStore::new(dir.path());

        let err = store.save(NAME, &[session("D1")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "{err}");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_corrupt_data() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(NAME), b"[{\"id\": \"D1\"").unwrap();
        let store = FileStore::new(dir.path());

        let err = store.load(NAME).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptData { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_load_whitespace_file_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(NAME), b"  \n").unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load(NAME).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_for_rejects_traversal() {
        let store = FileStore::new("/tmp/history");
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("..").is_err());
        assert!(store.path_for(NAME).is_ok());
    }

    #[tokio::test]
    async fn test_list_buckets_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store
            .save("flights_2024-03-10_2024-03-16.json", &[session("D1")])
            .await
            .unwrap();
        store.save(NAME, &[session("D1")]).await.unwrap();
        std::fs::write(dir.path().join("README.txt"), b"hi").unwrap();

        let buckets = store.list_buckets().await.unwrap();
        let names: Vec<_> = buckets.iter().map(|b| b.filename.as_str()).collect();
        assert_eq!(names, vec![NAME, "flights_2024-03-10_2024-03-16.json"]);
    }

    #[tokio::test]
    async fn test_list_buckets_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        assert!(store.list_buckets().await.unwrap().is_empty());
    }
}
