// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository access as consumed by the synchronization engine.

[ArchiveReader] is the engine's window onto an archive: enumeration of
already-parsed package records per (suite, component, architecture) and
materialization of referenced files onto the local disk. Metadata parsing
lives behind implementations of this trait and is out of scope here.

[LocalPool] and [HttpPool] are materialization building blocks for
implementors: one resolves file references against a local archive tree, the
other downloads pool files into a cache directory.
*/

use {
    crate::{
        error::{Result, SyncError},
        package::{BinaryPackage, FileRef, SourcePackage},
    },
    async_trait::async_trait,
    std::path::{Path, PathBuf},
};

#[cfg(feature = "http")]
use {
    futures::StreamExt,
    reqwest::{Client, IntoUrl, Url},
    tokio::io::AsyncWriteExt,
};

/// Read access to one package archive.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    /// Human readable identifier of the archive, for diagnostics.
    fn base_location(&self) -> String;

    /// Enumerate source packages in a (suite, component).
    async fn source_packages(&self, suite: &str, component: &str) -> Result<Vec<SourcePackage>>;

    /// Enumerate binary packages in a (suite, component, architecture).
    async fn binary_packages(
        &self,
        suite: &str,
        component: &str,
        architecture: &str,
    ) -> Result<Vec<BinaryPackage>>;

    /// Enumerate debian-installer packages in a (suite, component, architecture).
    async fn installer_packages(
        &self,
        suite: &str,
        component: &str,
        architecture: &str,
    ) -> Result<Vec<BinaryPackage>>;

    /// Ensure a referenced file is present on the local disk.
    ///
    /// May fetch over the network. Must be idempotent and safe to call
    /// concurrently for distinct file references.
    async fn materialize(&self, file: &FileRef) -> Result<PathBuf>;
}

/// Resolves file references against an archive rooted in a local directory.
#[derive(Clone, Debug)]
pub struct LocalPool {
    root_dir: PathBuf,
}

impl LocalPool {
    /// Construct an instance bound to the root directory specified.
    ///
    /// No validation of the passed path is performed.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
        }
    }

    /// Resolve a file reference to its on-disk path.
    ///
    /// The file must already exist; a local archive has nothing to fetch.
    pub async fn resolve_file(&self, file: &FileRef) -> Result<PathBuf> {
        let path = self.root_dir.join(&file.path);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;

        if let Some(expected) = file.size {
            if metadata.len() != expected {
                return Err(SyncError::RepositoryIoPath(
                    file.path.clone(),
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!(
                            "size mismatch: expected {} bytes, found {}",
                            expected,
                            metadata.len()
                        ),
                    ),
                ));
            }
        }

        Ok(path)
    }
}

/// Downloads pool files from an HTTP archive into a local cache directory.
///
/// The cache mirrors the pool layout of the remote archive, so the archive
/// management tool finds the companion files of a `.dsc` next to it, the
/// same way it would in the archive itself.
#[cfg(feature = "http")]
#[derive(Clone, Debug)]
pub struct HttpPool {
    client: Client,
    root_url: Url,
    cache_dir: PathBuf,
}

#[cfg(feature = "http")]
impl HttpPool {
    /// Construct an instance bound to the specified URL and cache directory.
    pub fn new(url: impl IntoUrl, cache_dir: impl AsRef<Path>) -> Result<Self> {
        Self::new_client(Client::default(), url, cache_dir)
    }

    /// Construct an instance using the given [Client].
    pub fn new_client(
        client: Client,
        url: impl IntoUrl,
        cache_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let mut root_url = url.into_url()?;

        // Trailing slashes are significant to the Url type when we .join().
        if !root_url.path().ends_with('/') {
            root_url.set_path(&format!("{}/", root_url.path()));
        }

        Ok(Self {
            client,
            root_url,
            cache_dir: cache_dir.as_ref().to_path_buf(),
        })
    }

    /// The URL this pool fetches from.
    pub fn url(&self) -> &Url {
        &self.root_url
    }

    /// Ensure a referenced file is present in the cache, fetching it if
    /// necessary. Returns the local path.
    ///
    /// A cached file whose size matches the reference is reused without a
    /// request. Downloads go to a temporary name and are renamed into place,
    /// so concurrent fetches of the same reference settle on a complete
    /// file.
    pub async fn fetch_file(&self, file: &FileRef) -> Result<PathBuf> {
        let dest_path = self.cache_dir.join(&file.path);

        if let Ok(metadata) = tokio::fs::metadata(&dest_path).await {
            if file.size.is_none() || file.size == Some(metadata.len()) {
                return Ok(dest_path);
            }
        }

        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;
        }

        let res = self
            .client
            .get(self.root_url.join(&file.path)?)
            .send()
            .await
            .map_err(|e| http_io_error(&file.path, "error sending HTTP request", e))?
            .error_for_status()
            .map_err(|e| http_io_error(&file.path, "bad HTTP status code", e))?;

        let tmp_path = dest_path.with_extension("part");
        let mut fh = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;

        let mut stream = res.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_io_error(&file.path, "error reading HTTP body", e))?;
            fh.write_all(&chunk)
                .await
                .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;
        }

        fh.flush()
            .await
            .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;
        drop(fh);

        tokio::fs::rename(&tmp_path, &dest_path)
            .await
            .map_err(|e| SyncError::RepositoryIoPath(file.path.clone(), e))?;

        Ok(dest_path)
    }
}

#[cfg(feature = "http")]
fn http_io_error(path: &str, message: &str, e: reqwest::Error) -> SyncError {
    SyncError::RepositoryIoPath(
        path.to_string(),
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{}: {:?}", message, e),
        ),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn local_pool_resolves_existing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool_dir = dir.path().join("pool/main/f/foo");
        std::fs::create_dir_all(&pool_dir)?;
        std::fs::write(pool_dir.join("foo_1.2-1.dsc"), b"Format: 3.0 (quilt)\n")?;

        let pool = LocalPool::new(dir.path());

        let mut file = FileRef::new("pool/main/f/foo/foo_1.2-1.dsc");
        let path = pool.resolve_file(&file).await?;
        assert!(path.ends_with("pool/main/f/foo/foo_1.2-1.dsc"));

        file.size = Some(20);
        assert!(pool.resolve_file(&file).await.is_ok());

        file.size = Some(21);
        assert!(matches!(
            pool.resolve_file(&file).await,
            Err(SyncError::RepositoryIoPath(_, _))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn local_pool_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = LocalPool::new(dir.path());

        let res = pool
            .resolve_file(&FileRef::new("pool/main/f/foo/foo_1.2-1.dsc"))
            .await;
        assert!(matches!(res, Err(SyncError::RepositoryIoPath(_, _))));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn http_pool_reuses_cached_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cached = dir.path().join("pool/main/f/foo/foo_1.2-1.dsc");
        std::fs::create_dir_all(cached.parent().unwrap())?;
        std::fs::write(&cached, b"cached")?;

        // The URL is never contacted since the cache is warm.
        let pool = HttpPool::new("http://archive.invalid/debian", dir.path())?;

        let mut file = FileRef::new("pool/main/f/foo/foo_1.2-1.dsc");
        file.size = Some(6);
        assert_eq!(pool.fetch_file(&file).await?, cached);

        Ok(())
    }
}
