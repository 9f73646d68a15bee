//! Content-addressed blob store.
//!
//! Blobs are named by the lowercase hex SHA-256 of their bytes and sharded by
//! the first two byte pairs of the digest: `root/ab/cd/abcd….pdf`. Downloads
//! are staged under `root/.staging` (same filesystem) and renamed into place,
//! so a final path never holds a partial file.

use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

const STAGING_DIR: &str = ".staging";
const BLOB_EXTENSION: &str = "pdf";
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Errors raised by the blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Filesystem operation failed.
    #[error("blob store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A digest string is not 64 lowercase hex characters.
    #[error("invalid blob digest: {0}")]
    InvalidDigest(String),
}

impl BlobError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Checksums the public archive computes for every file it holds, kept so
/// uploads can be matched against them later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    /// Lowercase hex MD5.
    pub md5: String,
    /// Lowercase hex SHA-1.
    pub sha1: String,
}

/// Outcome of committing content to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPut {
    /// Lowercase hex SHA-256.
    pub digest: String,
    /// Final path of the blob.
    pub path: PathBuf,
    /// Content length in bytes.
    pub size: u64,
    pub checksums: Checksums,
    /// False when a blob with this digest already existed.
    pub newly_written: bool,
}

/// Content-addressed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for in-flight downloads.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Returns a fresh, unused path inside the staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] if the staging directory cannot be created.
    pub async fn staging_path(&self) -> Result<PathBuf, BlobError> {
        let dir = self.staging_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BlobError::io(&dir, e))?;
        let token: u64 = rand::thread_rng().r#gen();
        Ok(dir.join(format!("{token:016x}.part")))
    }

    /// Deterministic path for a digest.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::InvalidDigest`] for anything but 64 hex characters.
    pub fn path_for(&self, digest: &str) -> Result<PathBuf, BlobError> {
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BlobError::InvalidDigest(digest.to_string()));
        }
        let digest = digest.to_ascii_lowercase();
        Ok(self
            .root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(format!("{digest}.{BLOB_EXTENSION}")))
    }

    /// Returns true when a blob with this digest is stored.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::InvalidDigest`] for malformed digests.
    pub async fn exists(&self, digest: &str) -> Result<bool, BlobError> {
        let path = self.path_for(digest)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Stores `bytes`, returning their digest. Identical content is written once.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] if staging or the final rename fails.
    pub async fn put(&self, bytes: &[u8]) -> Result<BlobPut, BlobError> {
        let staged = self.staging_path().await?;
        let mut file = tokio::fs::File::create(&staged)
            .await
            .map_err(|e| BlobError::io(&staged, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| BlobError::io(&staged, e))?;
        file.flush().await.map_err(|e| BlobError::io(&staged, e))?;
        drop(file);
        self.put_file(&staged).await
    }

    /// Commits a staged file: hashes it, then renames it to its digest path
    /// or discards it when that blob already exists.
    ///
    /// The staged file is consumed in both cases.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] if the file cannot be read or moved.
    #[instrument(skip(self, staged), fields(staged = %staged.display()))]
    pub async fn put_file(&self, staged: &Path) -> Result<BlobPut, BlobError> {
        let hashed = hash_file(staged).await?;
        let (digest, size, checksums) = (hashed.digest, hashed.size, hashed.checksums);
        let path = self.path_for(&digest)?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%digest, "blob already stored; discarding staged copy");
            tokio::fs::remove_file(staged)
                .await
                .map_err(|e| BlobError::io(staged, e))?;
            return Ok(BlobPut {
                digest,
                path,
                size,
                checksums,
                newly_written: false,
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::io(parent, e))?;
        }
        tokio::fs::rename(staged, &path)
            .await
            .map_err(|e| BlobError::io(&path, e))?;

        debug!(%digest, size, path = %path.display(), "blob committed");
        Ok(BlobPut {
            digest,
            path,
            size,
            checksums,
            newly_written: true,
        })
    }
}

/// Computes the [`Checksums`] of a stored file.
///
/// # Errors
///
/// Returns [`BlobError::Io`] if the file cannot be read.
pub async fn file_checksums(path: &Path) -> Result<Checksums, BlobError> {
    Ok(hash_file(path).await?.checksums)
}

struct Hashed {
    digest: String,
    size: u64,
    checksums: Checksums,
}

/// Streams a file once through SHA-256, SHA-1 and MD5.
async fn hash_file(path: &Path) -> Result<Hashed, BlobError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| BlobError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut sha1 = Sha1::new();
    let mut md5 = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut size: u64 = 0;

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| BlobError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        sha1.update(&buffer[..read]);
        md5.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(Hashed {
        digest: hex::encode(hasher.finalize()),
        size,
        checksums: Checksums {
            md5: hex::encode(md5.finalize()),
            sha1: hex::encode(sha1.finalize()),
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn test_put_returns_sha256_and_sharded_path() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());

        let put = store.put(b"hello").await.unwrap();
        assert_eq!(put.digest, HELLO_SHA256);
        assert_eq!(put.size, 5);
        assert!(put.newly_written);
        assert_eq!(
            put.path,
            dir.path().join("2c").join("f2").join(format!("{HELLO_SHA256}.pdf"))
        );
        assert_eq!(tokio::fs::read(&put.path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_put_computes_md5_and_sha1_in_the_same_pass() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());

        let put = store.put(b"hello").await.unwrap();
        assert_eq!(put.checksums.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(put.checksums.sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(file_checksums(&put.path).await.unwrap(), put.checksums);
    }

    #[tokio::test]
    async fn test_put_same_bytes_twice_writes_once() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());

        let first = store.put(b"%PDF-1.4 scan").await.unwrap();
        let second = store.put(b"%PDF-1.4 scan").await.unwrap();

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.path, second.path);
        assert!(!second.newly_written);

        let shard = first.path.parent().unwrap();
        let mut entries = tokio::fs::read_dir(shard).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_put_file_consumes_staged_file() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        let staged = store.staging_path().await.unwrap();
        tokio::fs::write(&staged, b"hello").await.unwrap();

        let put = store.put_file(&staged).await.unwrap();
        assert!(!staged.exists());
        assert!(store.exists(&put.digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_staging_dir_is_left_empty_after_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        store.put(b"same").await.unwrap();
        store.put(b"same").await.unwrap();

        let mut entries = tokio::fs::read_dir(store.staging_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[test]
    fn test_path_for_rejects_malformed_digest() {
        let store = BlobStore::new("/tmp/blobs");
        assert!(matches!(
            store.path_for("../../etc/passwd"),
            Err(BlobError::InvalidDigest(_))
        ));
        assert!(store.path_for(HELLO_SHA256).is_ok());
    }

    #[tokio::test]
    async fn test_exists_false_for_unknown_digest() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        assert!(!store.exists(HELLO_SHA256).await.unwrap());
    }
}
