// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {crate::package_version::VersionError, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("package synchronization is disabled by configuration")]
    SyncDisabled,

    #[error("no package names were given to synchronize")]
    NoPackagesSpecified,

    #[error("version string error: {0}")]
    Version(#[from] VersionError),

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "http")]
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("failed to run the archive management tool: {0}")]
    DakInvocation(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, SyncError>;
