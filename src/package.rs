// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package records as consumed by the synchronization engine.

These are plain values describing already-parsed repository metadata. How
`Sources` and `Packages` indices are fetched and decoded is the concern of
the repository facade behind [crate::repository::ArchiveReader]; the engine
only ever sees the types in this module.
*/

use serde::Deserialize;

/// Reference to a file in a repository pool.
///
/// Opaque to the engine beyond its filename. The repository facade uses the
/// path and optional integrity data to locate and fetch the file.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FileRef {
    /// Path of the file relative to the repository root.
    pub path: String,
    /// Expected size in bytes, if known.
    pub size: Option<u64>,
    /// Hex encoded SHA-256 digest of the content, if known.
    pub sha256: Option<String>,
}

impl FileRef {
    pub fn new(path: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            size: None,
            sha256: None,
        }
    }

    /// The final path component.
    pub fn filename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A binary package a source package expects to produce, per its manifest.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpectedBinary {
    pub name: String,
    /// Source version the binary was built from. May lag behind the source
    /// package version when binaries have not been rebuilt yet.
    pub version: String,
}

/// A source package entry from a `Sources` index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourcePackage {
    pub name: String,
    pub version: String,
    pub component: String,
    /// Files belonging to this package. Exactly one should have a name
    /// ending in `.dsc`.
    pub files: Vec<FileRef>,
    /// Binary packages this source package claims to build.
    pub binaries: Vec<ExpectedBinary>,
}

/// A binary package entry from a `Packages` index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BinaryPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub component: String,
    /// Name of the source package this binary was built from.
    pub source_name: String,
    /// Version of the source package this binary was built from.
    pub source_version: String,
    pub file: FileRef,
    /// Whether this is a debian-installer (d-i) package.
    pub is_installer: bool,
}

/// A named release channel within an archive.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Suite {
    pub name: String,
    /// Components in this suite, in sync order.
    pub components: Vec<String>,
    /// Architectures this suite carries, including the pseudo-architecture
    /// `source`.
    pub architectures: Vec<String>,
    /// Name of a parent suite whose source packages overlay this suite's,
    /// if any.
    #[serde(default)]
    pub parent: Option<String>,
}

impl Suite {
    /// Architectures eligible for binary package synchronization.
    pub fn binary_architectures(&self) -> impl Iterator<Item = &str> {
        self.architectures
            .iter()
            .map(|a| a.as_str())
            .filter(|a| *a != "source")
    }
}

/// Common access to the identity of a package record.
///
/// Source and binary indices share the newest-wins construction logic in
/// [crate::package_index]; this trait is the seam that lets one generic
/// routine serve both package kinds.
pub trait PackageRecord {
    fn package_name(&self) -> &str;

    /// The raw version string. Parsed lazily since repository indices can
    /// carry malformed versions that only matter once compared.
    fn package_version(&self) -> &str;
}

impl PackageRecord for SourcePackage {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn package_version(&self) -> &str {
        &self.version
    }
}

impl PackageRecord for BinaryPackage {
    fn package_name(&self) -> &str {
        &self.name
    }

    fn package_version(&self) -> &str {
        &self.version
    }
}
