// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The package synchronization engine.

[SyncEngine] copies packages from a source archive into a target archive:
it indexes both archives, selects candidates under Debian version ordering,
materializes their files locally and drives imports through the archive
management tool. Source packages are always registered before any of their
binaries.

Two entry points exist. [SyncEngine::sync_packages()] synchronizes an
explicit list of packages in one component; [SyncEngine::autosync()] walks
every component of the target suite and synchronizes everything that is
newer in the source, skipping packages the derivative has modified.
*/

use {
    crate::{
        config::SyncConfig,
        dak::ArchiveImporter,
        error::{Result, SyncError},
        package::{BinaryPackage, ExpectedBinary, SourcePackage},
        package_index::newest_package_map,
        package_version::{compare_version_strings, version_revision},
        repository::ArchiveReader,
    },
    futures::StreamExt,
    log::{debug, error, info, warn},
    std::{
        cmp::Ordering,
        collections::{HashMap, HashSet},
        path::PathBuf,
    },
};

/// Events emitted as synchronization progresses.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// A source package was imported into the target suite.
    SourcePackageImported {
        name: String,
        version: String,
        source_suite: String,
        target_suite: String,
        forced: bool,
    },
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourcePackageImported {
                name,
                version,
                source_suite,
                target_suite,
                forced,
            } => {
                write!(
                    f,
                    "imported {} {} from {} into {}{}",
                    name,
                    version,
                    source_suite,
                    target_suite,
                    if *forced { " (forced)" } else { "" }
                )
            }
        }
    }
}

/// Classification of a package autosync could not handle by itself.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SyncIssueKind {
    /// The source has a newer version but the target carries local
    /// modifications; someone needs to merge.
    MergeRequired,
    /// The package vanished from the source but was modified in the target,
    /// so it is not removed automatically.
    MaybeCruft,
    /// The package should be removed from the target but removal did not
    /// happen.
    RemovalFailed,
}

/// A per-package problem report produced by [SyncEngine::autosync()].
#[derive(Clone, Debug)]
pub struct SyncIssue {
    pub kind: SyncIssueKind,
    pub package_name: String,
    pub source_version: Option<String>,
    pub target_version: Option<String>,
    pub source_suite: String,
    pub target_suite: String,
    pub details: Option<String>,
}

type SyncEventCallback = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// Outcome of considering one expected binary for synchronization.
enum BinarySelection {
    /// The binary does not exist in the source index for this architecture.
    NotInSource { in_target: bool },
    /// The source index entry claims a different source package.
    Disowned,
    /// The source manifest and the binary index disagree on the version.
    VersionMismatch,
    /// The target already has this binary in a newer or equal version.
    ExistingNewer,
    /// The target binary is a manual rebuild upload of an unmodified package.
    RebuildUpload,
    /// The target binary carries local modifications.
    TargetModified,
    /// A version string did not parse, so no comparison was possible.
    Incomparable,
    /// The binary was materialized and is ready for import.
    Fetched(PathBuf),
}

/// Drives package synchronization from a source archive into a target archive.
///
/// An engine is constructed per run from an immutable [SyncConfig] and the
/// two consumed facades. It holds no persistent state beyond the
/// `imports_trusted` flag; callers may invoke the entry points repeatedly.
pub struct SyncEngine {
    config: SyncConfig,
    source_repo: Box<dyn ArchiveReader>,
    target_repo: Box<dyn ArchiveReader>,
    dak: Box<dyn ArchiveImporter>,
    imports_trusted: bool,
    blacklist: HashSet<String>,
    event_cb: Option<SyncEventCallback>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        source_repo: Box<dyn ArchiveReader>,
        target_repo: Box<dyn ArchiveReader>,
        dak: Box<dyn ArchiveImporter>,
    ) -> Self {
        let imports_trusted = config.imports_trusted;
        let blacklist = config.blacklist.iter().cloned().collect();

        Self {
            config,
            source_repo,
            target_repo,
            dak,
            imports_trusted,
            blacklist,
            event_cb: None,
        }
    }

    /// Whether imported packages bypass signature verification.
    pub fn imports_trusted(&self) -> bool {
        self.imports_trusted
    }

    /// Change the trust setting between batches.
    pub fn set_imports_trusted(&mut self, trusted: bool) {
        self.imports_trusted = trusted;
    }

    /// Install a callback receiving [SyncEvent]s as synchronization
    /// progresses.
    pub fn set_event_callback(&mut self, cb: impl Fn(&SyncEvent) + Send + Sync + 'static) {
        self.event_cb = Some(Box::new(cb));
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(cb) = &self.event_cb {
            cb(&event);
        }
    }

    /// Synchronize an explicit list of packages in one component.
    ///
    /// Packages absent from the source, blacklisted, or already
    /// up to date in the target are skipped. `force` bypasses the
    /// target-version check for operator-initiated downgrades.
    ///
    /// Returns `false` as soon as any import is rejected.
    pub async fn sync_packages(
        &self,
        component: &str,
        package_names: &[String],
        force: bool,
    ) -> Result<bool> {
        if package_names.is_empty() {
            return Err(SyncError::NoPackagesSpecified);
        }
        if !self.config.sync_enabled {
            return Err(SyncError::SyncDisabled);
        }

        let dest_pkg_map = self.target_source_package_map(component).await?;
        let src_pkg_map = self
            .source_package_map(
                self.source_repo.as_ref(),
                &self.config.source.suite_name,
                component,
            )
            .await?;

        let mut synced = vec![];

        for name in package_names {
            let spkg = match src_pkg_map.get(name) {
                Some(spkg) => spkg,
                None => {
                    info!("Cannot sync {}: package does not exist in source.", name);
                    continue;
                }
            };

            if self.blacklist.contains(name) {
                info!("Cannot sync {}: package is blacklisted.", name);
                continue;
            }

            if let Some(dpkg) = dest_pkg_map.get(name) {
                let order = match compare_logged(name, &dpkg.version, &spkg.version) {
                    Some(order) => order,
                    None => continue,
                };

                if order != Ordering::Less {
                    if force {
                        warn!(
                            "{}: target version '{}' is newer than or equal to source version '{}'.",
                            name, dpkg.version, spkg.version
                        );
                    } else {
                        info!(
                            "Cannot sync {}: target version '{}' is newer than or equal to source version '{}'.",
                            name, dpkg.version, spkg.version
                        );
                        continue;
                    }
                }
            }

            // The source package must always be known to the archive tool
            // before any of its binaries.
            if !self.import_source_package(spkg, component).await? {
                return Ok(false);
            }

            self.emit(SyncEvent::SourcePackageImported {
                name: spkg.name.clone(),
                version: spkg.version.clone(),
                source_suite: self.config.source.suite_name.clone(),
                target_suite: self.config.target.suite.name.clone(),
                forced: force,
            });
            synced.push(spkg.clone());
        }

        self.import_binaries_for_sources(component, &synced, force)
            .await
    }

    /// Synchronize every package that is newer in the source archive.
    ///
    /// Walks all components of the target suite in order. Packages whose
    /// target version carries the distro tag in its Debian revision are
    /// never overwritten; they are reported as [SyncIssueKind::MergeRequired]
    /// instead. With `remove_cruft`, packages that vanished from the source
    /// are removed from the target or reported.
    ///
    /// Returns the success flag and the collected issues.
    pub async fn autosync(&self, remove_cruft: bool) -> Result<(bool, Vec<SyncIssue>)> {
        if !self.config.sync_enabled {
            return Err(SyncError::SyncDisabled);
        }

        let mut issues = vec![];
        let suite = &self.config.target.suite;

        for component in &suite.components {
            let dest_pkg_map = self.target_source_package_map(component).await?;
            let src_pkg_map = self
                .source_package_map(
                    self.source_repo.as_ref(),
                    &self.config.source.suite_name,
                    component,
                )
                .await?;

            let mut synced = vec![];

            for spkg in src_pkg_map.values() {
                if self.blacklist.contains(&spkg.name) {
                    debug!("Skipped sync of {}: package is blacklisted.", spkg.name);
                    continue;
                }

                if let Some(dpkg) = dest_pkg_map.get(&spkg.name) {
                    let order = match compare_logged(&spkg.name, &dpkg.version, &spkg.version) {
                        Some(order) => order,
                        None => continue,
                    };

                    if order != Ordering::Less {
                        debug!(
                            "Skipped sync of {}: target version '{}' is newer than or equal to source version '{}'.",
                            spkg.name, dpkg.version, spkg.version
                        );
                        continue;
                    }

                    // A modified target package is indicated via its Debian
                    // revision, e.g. "1.0-0tanglu1".
                    if self.has_distro_tag(&dpkg.version) {
                        info!(
                            "Not syncing {}/{}: target has modifications (found {}).",
                            spkg.name, spkg.version, dpkg.version
                        );

                        issues.push(SyncIssue {
                            kind: SyncIssueKind::MergeRequired,
                            package_name: spkg.name.clone(),
                            source_version: Some(spkg.version.clone()),
                            target_version: Some(dpkg.version.clone()),
                            source_suite: self.config.source.suite_name.clone(),
                            target_suite: suite.name.clone(),
                            details: None,
                        });
                        continue;
                    }
                }

                if !self.import_source_package(spkg, component).await? {
                    return Ok((false, issues));
                }

                self.emit(SyncEvent::SourcePackageImported {
                    name: spkg.name.clone(),
                    version: spkg.version.clone(),
                    source_suite: self.config.source.suite_name.clone(),
                    target_suite: suite.name.clone(),
                    forced: false,
                });
                synced.push(spkg.clone());
            }

            if !self
                .import_binaries_for_sources(component, &synced, false)
                .await?
            {
                return Ok((false, issues));
            }
        }

        if remove_cruft {
            self.collect_cruft(&mut issues).await?;
        }

        Ok((true, issues))
    }

    /// Import one source package into the target archive.
    ///
    /// All files of the package are materialized first: the archive tool
    /// reads the `.dsc` and expects its companions in the same directory.
    async fn import_source_package(&self, spkg: &SourcePackage, component: &str) -> Result<bool> {
        let mut dsc_path = None;

        for file in &spkg.files {
            let local_path = self.source_repo.materialize(file).await?;

            if file.filename().ends_with(".dsc") {
                dsc_path = Some(local_path);
            }
        }

        let dsc_path = match dsc_path {
            Some(path) => path,
            None => {
                error!(
                    "Critical consistency error: source package {} in repository {} has no .dsc file.",
                    spkg.name,
                    self.source_repo.base_location()
                );
                return Ok(false);
            }
        };

        self.dak
            .import_package_files(
                &self.config.target.suite.name,
                component,
                &[dsc_path],
                self.imports_trusted,
                true,
            )
            .await
    }

    /// Import the binary packages belonging to the given source packages.
    ///
    /// Binaries are selected per target architecture from newest-wins
    /// indices of both archives and submitted in one import batch per
    /// (source package, architecture). Selection of a single package's
    /// binary list runs with bounded parallelism to hide fetch latency.
    async fn import_binaries_for_sources(
        &self,
        component: &str,
        spkgs: &[SourcePackage],
        ignore_target_changes: bool,
    ) -> Result<bool> {
        if !self.config.sync_binaries {
            debug!("Skipping binary syncs.");
            return Ok(true);
        }

        let suite = &self.config.target.suite;
        let archs = suite
            .binary_architectures()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut src_bpkg_arch_map = HashMap::new();
        let mut dest_bpkg_arch_map = HashMap::new();
        for arch in &archs {
            src_bpkg_arch_map.insert(
                arch.clone(),
                self.binary_package_map(
                    self.source_repo.as_ref(),
                    &self.config.source.suite_name,
                    component,
                    arch,
                )
                .await?,
            );
            dest_bpkg_arch_map.insert(
                arch.clone(),
                self.binary_package_map(self.target_repo.as_ref(), &suite.name, component, arch)
                    .await?,
            );
        }

        // An arch:all package is visible through every concrete
        // architecture's index; track submissions so each file is handed to
        // the archive tool at most once per run.
        let mut submitted = HashSet::new();

        for spkg in spkgs {
            let mut bin_files_synced = false;
            let mut existing_packages = false;

            for arch in &archs {
                let src_bpkg_map = &src_bpkg_arch_map[arch];
                let dest_bpkg_map = &dest_bpkg_arch_map[arch];

                let selections = futures::stream::iter(spkg.binaries.iter().map(|bin| {
                    self.select_binary(spkg, bin, src_bpkg_map, dest_bpkg_map, ignore_target_changes)
                }))
                .buffered(self.config.binary_fetch_concurrency.max(1))
                .collect::<Vec<_>>()
                .await;

                let mut bin_files = vec![];
                let mut first_error = None;

                for selection in selections {
                    match selection {
                        Ok(BinarySelection::Fetched(path)) => {
                            if submitted.insert(path.clone()) {
                                bin_files.push(path);
                            }
                        }
                        Ok(BinarySelection::NotInSource { in_target }) => {
                            existing_packages |= in_target;
                        }
                        Ok(BinarySelection::ExistingNewer)
                        | Ok(BinarySelection::RebuildUpload) => {
                            existing_packages = true;
                        }
                        Ok(BinarySelection::Disowned)
                        | Ok(BinarySelection::VersionMismatch)
                        | Ok(BinarySelection::TargetModified)
                        | Ok(BinarySelection::Incomparable) => {}
                        Err(e) => {
                            // Let the remaining in-flight fetches settle
                            // before failing the batch.
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                }

                if let Some(e) = first_error {
                    return Err(e);
                }

                if !bin_files.is_empty() {
                    bin_files_synced = true;

                    if !self
                        .dak
                        .import_package_files(
                            &suite.name,
                            component,
                            &bin_files,
                            self.imports_trusted,
                            true,
                        )
                        .await?
                    {
                        return Ok(false);
                    }
                }
            }

            if !bin_files_synced && !existing_packages {
                warn!(
                    "No binary packages synced for source {}/{}.",
                    spkg.name, spkg.version
                );
            }
        }

        Ok(true)
    }

    /// Decide what to do with one expected binary of a source package.
    async fn select_binary(
        &self,
        spkg: &SourcePackage,
        bin: &ExpectedBinary,
        src_bpkg_map: &HashMap<String, BinaryPackage>,
        dest_bpkg_map: &HashMap<String, BinaryPackage>,
        ignore_target_changes: bool,
    ) -> Result<BinarySelection> {
        let bpkg = match src_bpkg_map.get(&bin.name) {
            Some(bpkg) => bpkg,
            None => {
                return Ok(BinarySelection::NotInSource {
                    in_target: dest_bpkg_map.contains_key(&bin.name),
                });
            }
        };

        if bpkg.source_name != spkg.name {
            warn!(
                "Not syncing binary package '{}': it belongs to source package '{}', not '{}'.",
                bpkg.name, bpkg.source_name, spkg.name
            );
            return Ok(BinarySelection::Disowned);
        }

        if bpkg.source_version != bin.version {
            info!(
                "Not syncing binary package '{}': version '{}' does not match source package version '{}'.",
                bpkg.name, bin.version, bpkg.source_version
            );
            return Ok(BinarySelection::VersionMismatch);
        }

        if let Some(ebpkg) = dest_bpkg_map.get(&bpkg.name) {
            let order = match compare_logged(&bpkg.name, &ebpkg.version, &bpkg.version) {
                Some(order) => order,
                None => return Ok(BinarySelection::Incomparable),
            };

            if order != Ordering::Less {
                info!(
                    "Not syncing binary package '{}/{}': existing binary package with newer or equal version '{}' found.",
                    bpkg.name, bpkg.version, ebpkg.version
                );
                return Ok(BinarySelection::ExistingNewer);
            }

            // Manual rebuild uploads of unmodified packages look like
            // "1.2-3b1". If the source distribution did a rebuild we do not
            // want to sync it, unless the source package itself moved past
            // the existing binary.
            if let Some(spkg_order) = compare_logged(&spkg.name, &spkg.version, &ebpkg.version) {
                if spkg_order != Ordering::Greater && is_rebuild_upload(&ebpkg.version) {
                    debug!(
                        "Not syncing binary package '{}/{}': existing binary package with rebuild upload '{}' found.",
                        bpkg.name, bpkg.version, ebpkg.version
                    );
                    return Ok(BinarySelection::RebuildUpload);
                }
            }

            if !ignore_target_changes && self.has_distro_tag(&ebpkg.version) {
                debug!(
                    "Cannot sync binary package {}/{}: target has modifications.",
                    bin.name, bin.version
                );
                return Ok(BinarySelection::TargetModified);
            }
        }

        let local_path = self.source_repo.materialize(&bpkg.file).await?;

        Ok(BinarySelection::Fetched(local_path))
    }

    /// Report and clean up packages present in the target but gone from the
    /// source suite.
    async fn collect_cruft(&self, issues: &mut Vec<SyncIssue>) -> Result<()> {
        let suite = &self.config.target.suite;

        let mut target_pkg_index = HashMap::new();
        for component in &suite.components {
            target_pkg_index.extend(
                self.source_package_map(self.target_repo.as_ref(), &suite.name, component)
                    .await?,
            );
        }

        for component in &suite.components {
            let src_pkg_map = self
                .source_package_map(
                    self.source_repo.as_ref(),
                    &self.config.source.suite_name,
                    component,
                )
                .await?;

            for name in src_pkg_map.keys() {
                target_pkg_index.remove(name);
            }
        }

        for (name, dpkg) in &target_pkg_index {
            let revision = version_revision(&dpkg.version);

            // Native packages are never removed.
            if revision.is_empty() {
                continue;
            }

            // Introduced in the derivative, not cruft.
            if revision.starts_with(&format!("0{}", self.config.target.distro_tag)) {
                continue;
            }

            // Modified here; flag for a human to look at instead of removing.
            if self.has_distro_tag(&dpkg.version) {
                issues.push(SyncIssue {
                    kind: SyncIssueKind::MaybeCruft,
                    package_name: name.clone(),
                    source_version: None,
                    target_version: Some(dpkg.version.clone()),
                    source_suite: self.config.source.suite_name.clone(),
                    target_suite: suite.name.clone(),
                    details: None,
                });
                continue;
            }

            if self.dak.package_is_removable(name, &suite.name).await? {
                match self.dak.remove_package(name, &suite.name).await {
                    Ok(true) => {
                        info!("Removed cruft package {}/{}.", name, dpkg.version);
                    }
                    Ok(false) => {
                        issues.push(self.removal_failed_issue(
                            name,
                            dpkg,
                            "The archive tool refused the removal.",
                        ));
                    }
                    Err(e) => {
                        issues.push(self.removal_failed_issue(name, dpkg, &e.to_string()));
                    }
                }
            } else {
                issues.push(self.removal_failed_issue(
                    name,
                    dpkg,
                    "This package can not be removed without breaking other packages. It needs manual removal.",
                ));
            }
        }

        Ok(())
    }

    fn removal_failed_issue(&self, name: &str, dpkg: &SourcePackage, details: &str) -> SyncIssue {
        SyncIssue {
            kind: SyncIssueKind::RemovalFailed,
            package_name: name.to_string(),
            source_version: None,
            target_version: Some(dpkg.version.clone()),
            source_suite: self.config.source.suite_name.clone(),
            target_suite: self.config.target.suite.name.clone(),
            details: Some(details.to_string()),
        }
    }

    fn has_distro_tag(&self, version: &str) -> bool {
        let tag = &self.config.target.distro_tag;

        !tag.is_empty() && version_revision(version).contains(tag.as_str())
    }

    /// Newest-wins map of the source packages in a (suite, component).
    async fn source_package_map(
        &self,
        repo: &dyn ArchiveReader,
        suite: &str,
        component: &str,
    ) -> Result<HashMap<String, SourcePackage>> {
        Ok(newest_package_map(
            repo.source_packages(suite, component).await?,
        ))
    }

    /// Newest-wins map of the target suite's source packages, overlaid over
    /// its parent suite's when one is configured.
    async fn target_source_package_map(
        &self,
        component: &str,
    ) -> Result<HashMap<String, SourcePackage>> {
        let suite = &self.config.target.suite;
        let suite_map = self
            .source_package_map(self.target_repo.as_ref(), &suite.name, component)
            .await?;

        Ok(match &suite.parent {
            Some(parent) => {
                let parent_map = self
                    .source_package_map(self.target_repo.as_ref(), parent, component)
                    .await?;

                newest_package_map(parent_map.into_values().chain(suite_map.into_values()))
            }
            None => suite_map,
        })
    }

    /// Newest-wins map of the binary packages in a (suite, component,
    /// architecture).
    ///
    /// arch:all packages are always merged in, as are debian-installer
    /// packages; an installer entry replaces a regular one only when
    /// strictly newer.
    async fn binary_package_map(
        &self,
        repo: &dyn ArchiveReader,
        suite: &str,
        component: &str,
        architecture: &str,
    ) -> Result<HashMap<String, BinaryPackage>> {
        let mut bpkgs = repo.binary_packages(suite, component, architecture).await?;
        if architecture != "all" {
            bpkgs.extend(repo.binary_packages(suite, component, "all").await?);
        }

        let mut installers = repo
            .installer_packages(suite, component, architecture)
            .await?;
        if architecture != "all" {
            installers.extend(repo.installer_packages(suite, component, "all").await?);
        }

        Ok(newest_package_map(bpkgs.into_iter().chain(installers)))
    }
}

/// Compare two version strings, degrading a parse failure into "cannot
/// compare" with a warning.
fn compare_logged(name: &str, a: &str, b: &str) -> Option<Ordering> {
    match compare_version_strings(a, b) {
        Ok(order) => Some(order),
        Err(e) => {
            warn!(
                "Cannot compare versions '{}' and '{}' for {}: {}",
                a, b, name, e
            );
            None
        }
    }
}

/// Whether a version string looks like a manual rebuild upload (binNMU),
/// e.g. "1.2-3b1". Versions containing "deb" (stable updates like
/// "1.2-3+deb11u1") do not count.
fn is_rebuild_upload(version: &str) -> bool {
    if version.contains("deb") {
        return false;
    }

    version
        .as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'b' && pair[1].is_ascii_digit())
}
