// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package synchronization for Debian-derivative archives.

This crate implements the synchronization engine a Debian-derivative Linux
distribution uses to pull packages from its upstream: given a *source*
archive (a Debian-like repository) and a *target* archive (the distribution
being maintained), it computes which source and binary packages should be
copied and drives their import through the archive management tool (`dak`).

# A Tour of Functionality

The [package_version] module implements Debian package version string
parsing, serialization, and comparison with the semantics of
`dpkg --compare-versions`. [package_version::PackageVersion] is the main
type used for this; [package_version::version_revision()] extracts the
Debian revision suffix local forks mark themselves in.

The [package] module defines the package records the engine consumes:
[package::SourcePackage], [package::BinaryPackage], the
[package::FileRef] file reference, and [package::Suite]. How these records
are parsed out of `Sources` and `Packages` indices is out of scope;
implementations of the [repository::ArchiveReader] trait deliver them
already parsed and materialize referenced files onto the local disk.
[repository::LocalPool] and [repository::HttpPool] are materialization
building blocks for such implementations.

The [package_index] module collapses package lists into newest-wins maps of
name to package, the shape all selection logic operates on.

The [dak] module is the bridge to the archive management tool that owns the
target archive's on-disk state. [dak::ArchiveImporter] is the consumed
interface; [dak::DakRunner] implements it by running the `dak` command line
tool.

The [engine] module ties everything together. [engine::SyncEngine] offers
two entry points: [engine::SyncEngine::sync_packages()] synchronizes an
explicit list of packages and [engine::SyncEngine::autosync()] sweeps the
whole target suite, preserving locally modified packages and reporting
[engine::SyncIssue]s for anything needing human attention.

Configuration is handled by [config::SyncConfig], typically loaded from a
YAML document.

# Crate Features

The optional and enabled-by-default `http` feature enables HTTP client
support for fetching pool files from remote archives.
*/

pub mod config;
pub mod dak;
pub mod engine;
pub mod error;
pub mod package;
pub mod package_index;
pub mod package_version;
pub mod repository;
