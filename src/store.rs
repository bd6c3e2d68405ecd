//! Content-addressable blob store.
//!
//! Blobs are named `hex(md5(content)) + original-extension`, so identical
//! bytes always resolve to the same stored name no matter how often or
//! under what source name they are ingested. Entries are created on first
//! ingestion of novel content and never mutated; retention is someone
//! else's concern.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tempfile::NamedTempFile;
use thiserror::Error;

const DIGEST_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob `{name}` is not found in the store")]
    NotFound { name: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// Retrieves a remote resource into a local writer. Kept as a seam so the
/// store never owns an HTTP client; callers plug in whatever their process
/// already uses.
pub trait UrlFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// The directory itself is created lazily, on first ingestion.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True iff a blob with this stored name exists and is non-empty.
    pub fn has(&self, name: &str) -> bool {
        fs::metadata(self.root.join(name))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Reads a stored blob fully into memory.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.root.join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(StoreError::Io { path, source: err }),
        }
    }

    /// Stores an in-memory buffer. `extension` keeps its leading dot
    /// (".bin") or is empty.
    pub fn ingest_bytes(&self, data: &[u8], extension: &str) -> Result<String, StoreError> {
        let mut temp = self.begin_ingest()?;
        temp.write_all(data).map_err(|err| StoreError::Io {
            path: temp.path().to_path_buf(),
            source: err,
        })?;
        self.finish_ingest(temp, extension)
    }

    /// Stores a copy of a local file, keeping its extension.
    pub fn ingest_file(&self, source: &Path) -> Result<String, StoreError> {
        let mut reader = File::open(source).map_err(|err| StoreError::Io {
            path: source.to_path_buf(),
            source: err,
        })?;
        let mut temp = self.begin_ingest()?;
        io::copy(&mut reader, &mut temp).map_err(|err| StoreError::Io {
            path: temp.path().to_path_buf(),
            source: err,
        })?;
        self.finish_ingest(temp, &extension_of(source))
    }

    /// Retrieves a remote resource through `fetcher` and stores it. The
    /// extension is taken from the URL's path component.
    pub fn ingest_url(&self, fetcher: &dyn UrlFetcher, url: &str) -> Result<String, StoreError> {
        let mut temp = self.begin_ingest()?;
        fetcher
            .fetch(url, &mut temp)
            .map_err(|err| StoreError::Fetch {
                url: url.to_string(),
                source: err,
            })?;
        self.finish_ingest(temp, &extension_of(Path::new(url_basename(url))))
    }

    /// Temp file under a random name inside the store directory, so
    /// concurrent ingestions never collide and the final rename stays on
    /// one filesystem.
    fn begin_ingest(&self) -> Result<NamedTempFile, StoreError> {
        fs::create_dir_all(&self.root).map_err(|err| StoreError::Io {
            path: self.root.clone(),
            source: err,
        })?;
        NamedTempFile::new_in(&self.root).map_err(|err| StoreError::Io {
            path: self.root.clone(),
            source: err,
        })
    }

    /// Digests the temp file, renames it to its final content-addressed
    /// name, or discards it when that name already exists.
    fn finish_ingest(&self, mut temp: NamedTempFile, extension: &str) -> Result<String, StoreError> {
        temp.flush().map_err(|err| StoreError::Io {
            path: temp.path().to_path_buf(),
            source: err,
        })?;
        let digest = digest_file(temp.path()).map_err(|err| StoreError::Io {
            path: temp.path().to_path_buf(),
            source: err,
        })?;

        let name = format!("{digest}{extension}");
        let final_path = self.root.join(&name);
        if final_path.exists() {
            // Dedup: identical content never produces a second stored copy.
            return Ok(name);
        }
        temp.persist(&final_path).map_err(|err| StoreError::Io {
            path: final_path,
            source: err.error,
        })?;
        Ok(name)
    }
}

/// Streams the file through MD5 in fixed-size chunks; never loads the whole
/// file to digest it.
fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut chunk = [0u8; DIGEST_CHUNK_BYTES];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// Last path segment of a URL, with query and fragment stripped.
fn url_basename(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query.rsplit('/').next().unwrap_or(without_query)
}
