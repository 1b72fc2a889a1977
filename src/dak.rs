// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Bridge to the archive management tool.

The target archive's on-disk state is owned by `dak`. The engine only ever
asks it to register already-materialized files into a (suite, component) and,
during cruft cleanup, to check and perform package removals. [ArchiveImporter]
is the seam the engine consumes; [DakRunner] implements it by invoking the
`dak` command line tool.
*/

use {
    crate::error::{Result, SyncError},
    async_trait::async_trait,
    std::{
        path::{Path, PathBuf},
        process::Stdio,
    },
    tokio::{io::AsyncWriteExt, process::Command},
};

/// Import and removal operations on the target archive.
#[async_trait]
pub trait ArchiveImporter: Send + Sync {
    /// Register a set of locally present package files in a (suite, component).
    ///
    /// Returns `false` if the archive tool rejected the import. The caller
    /// is expected not to re-submit the same files within a run.
    async fn import_package_files(
        &self,
        suite: &str,
        component: &str,
        files: &[PathBuf],
        trusted: bool,
        allow_new: bool,
    ) -> Result<bool>;

    /// Whether a package can be removed from a suite without breaking
    /// reverse dependencies.
    async fn package_is_removable(&self, package: &str, suite: &str) -> Result<bool>;

    /// Remove a package from a suite. Returns `false` if the tool refused.
    async fn remove_package(&self, package: &str, suite: &str) -> Result<bool>;
}

/// Runs the `dak` command line tool.
#[derive(Clone, Debug)]
pub struct DakRunner {
    dak_executable: PathBuf,
}

impl Default for DakRunner {
    fn default() -> Self {
        Self::new("dak")
    }
}

impl DakRunner {
    /// Construct an instance invoking the given executable.
    pub fn new(dak_executable: impl AsRef<Path>) -> Self {
        Self {
            dak_executable: dak_executable.as_ref().to_path_buf(),
        }
    }

    async fn run_dak(&self, args: &[String], input: Option<&str>) -> Result<(bool, String)> {
        let mut command = Command::new(&self.dak_executable);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            SyncError::DakInvocation(format!(
                "unable to spawn {}: {}",
                self.dak_executable.display(),
                e
            ))
        })?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child.wait_with_output().await?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            log::debug!(
                "dak {} exited with {}: {}",
                args.first().map(|s| s.as_str()).unwrap_or(""),
                output.status,
                text.trim()
            );
        }

        Ok((output.status.success(), text))
    }
}

/// Assemble the argument vector for a `dak import` invocation.
fn import_args(
    suite: &str,
    component: &str,
    files: &[PathBuf],
    trusted: bool,
    allow_new: bool,
) -> Vec<String> {
    let mut args = vec!["import".to_string()];

    if trusted {
        // skip signature verification
        args.push("-s".to_string());
    }
    if allow_new {
        // add overrides for packages new to the target
        args.push("-a".to_string());
    }

    args.push(suite.to_string());
    args.push(component.to_string());
    args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));

    args
}

fn removal_check_args(package: &str, suite: &str) -> Vec<String> {
    [
        "rm",
        "-R",
        "-n",
        "-s",
        suite,
        package,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn removal_args(package: &str, suite: &str) -> Vec<String> {
    [
        "rm",
        "-m",
        "synchronization cruft cleanup",
        "-s",
        suite,
        package,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[async_trait]
impl ArchiveImporter for DakRunner {
    async fn import_package_files(
        &self,
        suite: &str,
        component: &str,
        files: &[PathBuf],
        trusted: bool,
        allow_new: bool,
    ) -> Result<bool> {
        let args = import_args(suite, component, files, trusted, allow_new);
        let (success, output) = self.run_dak(&args, None).await?;

        if !success {
            log::error!(
                "dak rejected import into {}/{}: {}",
                suite,
                component,
                output.trim()
            );
        }

        Ok(success)
    }

    async fn package_is_removable(&self, package: &str, suite: &str) -> Result<bool> {
        let (success, output) = self
            .run_dak(&removal_check_args(package, suite), None)
            .await?;

        Ok(success && output.contains("No dependency problem found"))
    }

    async fn remove_package(&self, package: &str, suite: &str) -> Result<bool> {
        // dak asks for confirmation before touching the archive.
        let (success, _) = self.run_dak(&removal_args(package, suite), Some("y\n")).await?;

        Ok(success)
    }
}
