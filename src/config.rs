// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Synchronization configuration.

One [SyncConfig] describes a single source/target archive pairing and is
immutable for the duration of a run. Configurations are typically loaded
from YAML documents:

```yaml
sync_enabled: true
sync_binaries: true
source:
  repo_url: "https://deb.debian.org/debian"
  os_name: "Debian"
  suite_name: "testing"
  keyrings:
    - "/etc/keyrings/debian-archive.gpg"
target:
  archive_root_path: "/srv/archive"
  project_name: "master"
  distro_tag: "tanglu"
  suite:
    name: "staging"
    components: ["main", "contrib"]
    architectures: ["source", "amd64", "arm64"]
blacklist:
  - "linux-signed-amd64"
```
*/

use {
    crate::{error::Result, package::Suite},
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

/// Top-level configuration for one synchronization pairing.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master gate. When false both entry points refuse to run.
    pub sync_enabled: bool,

    /// When false, binary packages are never copied.
    pub sync_binaries: bool,

    /// Whether imported packages bypass signature verification in the
    /// archive tool.
    pub imports_trusted: bool,

    /// Bound on concurrent pool file fetches during binary selection.
    pub binary_fetch_concurrency: usize,

    /// The archive packages are synchronized from.
    pub source: SourceConfig,

    /// The archive packages are imported into.
    pub target: TargetConfig,

    /// Package names never considered for synchronization.
    pub blacklist: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            sync_binaries: true,
            imports_trusted: true,
            binary_fetch_concurrency: 4,
            source: SourceConfig::default(),
            target: TargetConfig::default(),
            blacklist: vec![],
        }
    }
}

/// Parameters of the source archive.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the source archive.
    pub repo_url: String,

    /// Display name of the source operating system.
    pub os_name: String,

    /// Suite within the source archive to synchronize from.
    pub suite_name: String,

    /// PGP keyrings trusted for source archive metadata.
    pub keyrings: Vec<PathBuf>,
}

/// Parameters of the target archive.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Root directory of the target archive.
    pub archive_root_path: PathBuf,

    /// Name of the archive project within the target repository.
    pub project_name: String,

    /// Substring marking local fork revisions, e.g. `tanglu` in
    /// `1.0-0tanglu1`.
    pub distro_tag: String,

    /// Suite packages are imported into.
    pub suite: Suite,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            archive_root_path: PathBuf::new(),
            project_name: "master".to_string(),
            distro_tag: String::new(),
            suite: Suite {
                name: String::new(),
                components: vec![],
                architectures: vec![],
                parent: None,
            },
        }
    }
}

impl SyncConfig {
    /// Parse a configuration from YAML data.
    pub fn from_yaml_data(data: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Parse a configuration from a YAML file.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml_data(&std::fs::read(path.as_ref())?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EXAMPLE: &str = r#"
sync_enabled: true
sync_binaries: false
source:
  repo_url: "https://deb.debian.org/debian"
  os_name: "Debian"
  suite_name: "testing"
target:
  archive_root_path: "/srv/archive"
  distro_tag: "tanglu"
  suite:
    name: "staging"
    components: ["main", "contrib"]
    architectures: ["source", "amd64"]
    parent: "landing"
blacklist:
  - "linux-signed-amd64"
"#;

    #[test]
    fn parse_yaml() -> Result<()> {
        let config = SyncConfig::from_yaml_data(EXAMPLE.as_bytes())?;

        assert!(config.sync_enabled);
        assert!(!config.sync_binaries);
        // Defaults apply to omitted fields.
        assert!(config.imports_trusted);
        assert_eq!(config.binary_fetch_concurrency, 4);

        assert_eq!(config.source.suite_name, "testing");
        assert_eq!(config.target.distro_tag, "tanglu");
        assert_eq!(config.target.suite.components, vec!["main", "contrib"]);
        assert_eq!(config.target.suite.parent.as_deref(), Some("landing"));
        assert_eq!(config.blacklist, vec!["linux-signed-amd64"]);

        Ok(())
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();

        assert!(config.sync_enabled);
        assert!(config.sync_binaries);
        assert!(config.imports_trusted);
        assert_eq!(config.target.project_name, "master");
        assert!(config.blacklist.is_empty());
    }
}
