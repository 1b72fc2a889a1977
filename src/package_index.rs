// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Newest-wins package indices.

Repository indices commonly list several versions of the same package. The
engine only ever wants the newest entry per name, so indices are collapsed
into maps before any selection logic runs. The maps are built once per sync
batch and treated as read-only snapshots afterwards.
*/

use {
    crate::{
        package::PackageRecord,
        package_version::{PackageVersion, VersionError},
    },
    std::collections::HashMap,
};

/// Build a mapping of package name to the newest package of that name.
///
/// For each input package the entry with the greatest version under Debian
/// ordering is kept. Ties on version keep the first encountered entry, which
/// makes merges stable: to overlay one package set over another, chain the
/// base set first and the overlay second, and overlay entries replace base
/// entries only when strictly newer.
///
/// Packages whose version string does not parse cannot participate in
/// comparisons and are dropped with a warning.
pub fn newest_package_map<P: PackageRecord>(
    packages: impl IntoIterator<Item = P>,
) -> HashMap<String, P> {
    let mut entries: HashMap<String, (P, PackageVersion)> = HashMap::new();

    for pkg in packages {
        let version = match PackageVersion::parse(pkg.package_version()) {
            Ok(version) => version,
            Err(e) => {
                warn_unparsable(pkg.package_name(), pkg.package_version(), &e);
                continue;
            }
        };

        match entries.get(pkg.package_name()) {
            Some((_, existing)) if *existing >= version => {}
            _ => {
                entries.insert(pkg.package_name().to_string(), (pkg, version));
            }
        }
    }

    entries.into_iter().map(|(name, (pkg, _))| (name, pkg)).collect()
}

fn warn_unparsable(name: &str, version: &str, e: &VersionError) {
    log::warn!(
        "Ignoring package {} with unparsable version '{}': {}",
        name,
        version,
        e
    );
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::package::{BinaryPackage, FileRef, SourcePackage},
    };

    fn spkg(name: &str, version: &str) -> SourcePackage {
        SourcePackage {
            name: name.to_string(),
            version: version.to_string(),
            component: "main".to_string(),
            files: vec![],
            binaries: vec![],
        }
    }

    fn bpkg(name: &str, version: &str, installer: bool) -> BinaryPackage {
        BinaryPackage {
            name: name.to_string(),
            version: version.to_string(),
            architecture: "amd64".to_string(),
            component: "main".to_string(),
            source_name: name.to_string(),
            source_version: version.to_string(),
            file: FileRef::new(format!("pool/{}_{}.deb", name, version)),
            is_installer: installer,
        }
    }

    #[test]
    fn newest_version_wins() {
        let map = newest_package_map(vec![
            spkg("foo", "1.0-1"),
            spkg("foo", "1.2-1"),
            spkg("foo", "1.1-1"),
            spkg("bar", "2.0-1"),
        ]);

        assert_eq!(map.len(), 2);
        assert_eq!(map["foo"].version, "1.2-1");
        assert_eq!(map["bar"].version, "2.0-1");
    }

    #[test]
    fn version_ties_keep_first_entry() {
        let mut first = spkg("foo", "1.0-1");
        first.component = "main".to_string();
        let mut second = spkg("foo", "1.0-1");
        second.component = "contrib".to_string();

        let map = newest_package_map(vec![first, second]);
        assert_eq!(map["foo"].component, "main");
    }

    #[test]
    fn unparsable_versions_are_dropped() {
        let map = newest_package_map(vec![spkg("foo", "not a version"), spkg("bar", "1.0-1")]);

        assert!(!map.contains_key("foo"));
        assert!(map.contains_key("bar"));
    }

    #[test]
    fn installer_packages_replace_only_when_newer() {
        // Installer entries chained after the regular ones, like the binary
        // index construction does it.
        let map = newest_package_map(vec![
            bpkg("netcfg", "1.0-1", false),
            bpkg("netcfg", "1.0-1", true),
        ]);
        assert!(!map["netcfg"].is_installer);

        let map = newest_package_map(vec![
            bpkg("netcfg", "1.0-1", false),
            bpkg("netcfg", "1.1-1", true),
        ]);
        assert!(map["netcfg"].is_installer);
    }
}
