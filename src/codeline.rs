// SPDX-License-Identifier: MIT

//! Codeline directory bootstrap.
//!
//! A __codeline__ is one independent checkout of the managed source tree,
//! living in its own directory under the tree root:
//!
//! ```text
//! <root>/<codeline>/source/             the checkout itself
//! <root>/<codeline>/output-<variant>/   one build directory per variant
//! <root>/<codeline>/run-all-configure.sh
//! ```
//!
//! Bootstrapping is idempotent: existing directories are kept, an existing
//! `source/` checkout is never re-cloned, and only the `--clean` option
//! removes anything (everything in the codeline directory except the
//! sources themselves).
//!
//! Sources are obtained through the version control binaries on `$PATH`;
//! this module knows nothing about the wire protocols involved.

use crate::{
    config::{BuildVariant, CodelineDefinition, TreeConfig, TreeSettings, VcsKind},
    syscall,
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// One codeline directory under the tree root.
#[derive(Debug, Clone)]
pub struct Codeline<'a> {
    definition: &'a CodelineDefinition,
    settings: &'a TreeSettings,
}

impl<'a> Codeline<'a> {
    pub fn new(definition: &'a CodelineDefinition, settings: &'a TreeSettings) -> Self {
        Self {
            definition,
            settings,
        }
    }

    /// The codeline's directory under the tree root.
    pub fn dir(&self) -> PathBuf {
        self.settings.root.join(&self.definition.name)
    }

    /// The checkout directory inside the codeline.
    pub fn source_dir(&self) -> PathBuf {
        self.dir().join("source")
    }

    /// The build directory for one variant.
    pub fn output_dir(&self, variant: &BuildVariant) -> PathBuf {
        self.dir().join(format!("output-{}", variant.name))
    }

    /// Configure options shared by every variant of this codeline.
    pub fn standard_configure_options(&self) -> Vec<String> {
        let boot_jdk = self
            .settings
            .root
            .join("jdks")
            .join(&self.settings.boot_jdk);
        let mut options = vec![format!("--with-boot-jdk={}", boot_jdk.display())];
        if let Some(gtest_dir) = &self.settings.gtest_dir {
            options.push(format!("--with-gtest={}", gtest_dir.display()));
        }

        options
    }

    /// Create the codeline directory, its per-variant output directories,
    /// and the `run-all-configure.sh` helper, then obtain sources if they
    /// are not present yet.
    ///
    /// # Errors
    ///
    /// - Return [`CodelineError::Io`] if directories or the helper script
    ///   cannot be created.
    /// - Return [`CodelineError::Syscall`] if source fetching fails.
    pub fn bootstrap(&self, variants: &[BuildVariant], clean: bool) -> Result<()> {
        let dir = self.dir();

        if clean && dir.exists() {
            self.clean_dir()?;
        }

        info!("bootstrapping codeline {}", self.definition.name);
        mkdirp::mkdirp(&dir).map_err(|err| io_error(err, &dir))?;
        for variant in variants {
            let output_dir = self.output_dir(variant);
            mkdirp::mkdirp(&output_dir).map_err(|err| io_error(err, &output_dir))?;
        }

        self.write_configure_script(variants)?;
        self.fetch_sources()?;

        Ok(())
    }

    /// Remove everything in the codeline directory except `source/`.
    ///
    /// Refuses to delete anything that does not live strictly inside the
    /// configured tree root.
    fn clean_dir(&self) -> Result<()> {
        info!("cleaning codeline dir {}", self.dir().display());
        let dir = self.dir();
        let entries = fs::read_dir(&dir).map_err(|err| io_error(err, &dir))?;
        for entry in entries {
            let entry = entry.map_err(|err| io_error(err, &dir))?;
            if entry.file_name() == "source" {
                continue;
            }
            self.remove_path_safe(&entry.path())?;
        }

        Ok(())
    }

    fn remove_path_safe(&self, path: &Path) -> Result<()> {
        let root = &self.settings.root;
        if !path.starts_with(root) || path == root.as_path() {
            return Err(CodelineError::UnsafeRemoval {
                path: path.to_path_buf(),
                root: root.clone(),
            });
        }

        debug!("removing {}", path.display());
        if path.is_dir() {
            fs::remove_dir_all(path).map_err(|err| io_error(err, path))?;
        } else {
            fs::remove_file(path).map_err(|err| io_error(err, path))?;
        }

        Ok(())
    }

    /// Write a helper script that runs configure in every output directory.
    fn write_configure_script(&self, variants: &[BuildVariant]) -> Result<()> {
        let standard = self.standard_configure_options();
        let mut lines = vec!["#!/bin/bash".to_owned(), "set -e".to_owned()];
        for variant in variants {
            let mut options = standard.clone();
            options.extend(variant.configure_options.iter().cloned());
            lines.push(format!("pushd output-{}", variant.name));
            lines.push(format!("bash ../source/configure {}", options.join(" ")));
            lines.push("popd".to_owned());
        }

        let script = self.dir().join("run-all-configure.sh");
        fs::write(&script, lines.join("\n") + "\n").map_err(|err| io_error(err, &script))?;

        Ok(())
    }

    /// Clone sources into `source/` unless the checkout already exists.
    fn fetch_sources(&self) -> Result<()> {
        let source_dir = self.source_dir();
        if source_dir.exists() {
            info!("{} found, skipping clone", source_dir.display());
            return Ok(());
        }

        let url = self.definition.url.as_str();
        let source = source_dir.to_string_lossy().into_owned();
        match self.definition.vcs {
            VcsKind::Git => {
                syscall::captured("git", ["clone", url, source.as_str()])?;
                if let Some(branch) = &self.definition.branch {
                    syscall::captured(
                        "git",
                        ["-C", source.as_str(), "checkout", branch.as_str()],
                    )?;
                }
            }
            VcsKind::Mercurial => {
                syscall::captured("hg", ["clone", url, source.as_str()])?;
            }
            VcsKind::MercurialForest => {
                syscall::captured("hg", ["clone", url, source.as_str()])?;
                syscall::captured(
                    "bash",
                    [source_dir.join("get_source.sh").to_string_lossy().as_ref()],
                )?;
            }
        }

        Ok(())
    }
}

/// Bootstrap every configured codeline.
///
/// # Errors
///
/// - Return the first [`CodelineError`] hit; codeline setup is sequential
///   and a failed clone is worth stopping for.
pub fn bootstrap_all(config: &TreeConfig, clean: bool) -> Result<()> {
    for definition in &config.codelines {
        Codeline::new(definition, &config.tree).bootstrap(&config.variants, clean)?;
    }

    Ok(())
}

fn io_error(source: std::io::Error, path: &Path) -> CodelineError {
    CodelineError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Codeline bootstrap error types.
#[derive(Debug, thiserror::Error)]
pub enum CodelineError {
    /// File system manipulation under the codeline directory failed.
    #[error("codeline setup failed at {}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Refused to delete a path outside the tree root.
    #[error("refusing to remove {} outside tree root {}", path.display(), root.display())]
    UnsafeRemoval { path: PathBuf, root: PathBuf },

    /// A version control command failed.
    #[error(transparent)]
    Syscall(#[from] syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = CodelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn test_settings(root: &Path) -> TreeSettings {
        TreeSettings {
            root: root.to_path_buf(),
            boot_jdk: "bootjdk".into(),
            guard_anchor: "src/hotspot".into(),
            gtest_dir: Some(root.join("gtest/googletest")),
        }
    }

    #[sealed_test]
    fn bootstrap_lays_out_codeline_directory() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("root");
        let settings = test_settings(&root);
        let definition = CodelineDefinition {
            name: "jdk-jdk".into(),
            vcs: VcsKind::Git,
            url: "ignored".into(),
            branch: None,
        };
        let codeline = Codeline::new(&definition, &settings);

        // Pre-create the checkout so bootstrap never shells out to git.
        fs::create_dir_all(codeline.source_dir())?;

        let variants = vec![
            BuildVariant {
                name: "fastdebug".into(),
                configure_options: vec!["--with-debug-level=fastdebug".into()],
            },
            BuildVariant {
                name: "release".into(),
                configure_options: vec!["--with-debug-level=release".into()],
            },
        ];
        codeline.bootstrap(&variants, false)?;

        assert!(root.join("jdk-jdk/output-fastdebug").is_dir());
        assert!(root.join("jdk-jdk/output-release").is_dir());

        let script = fs::read_to_string(root.join("jdk-jdk/run-all-configure.sh"))?;
        assert!(script.starts_with("#!/bin/bash\nset -e\n"));
        assert!(script.contains("pushd output-fastdebug"));
        assert!(script.contains(&format!(
            "bash ../source/configure --with-boot-jdk={} --with-gtest={} --with-debug-level=release",
            root.join("jdks/bootjdk").display(),
            root.join("gtest/googletest").display(),
        )));

        Ok(())
    }

    #[sealed_test]
    fn clean_keeps_sources_and_stays_inside_root() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("root");
        let settings = test_settings(&root);
        let definition = CodelineDefinition {
            name: "jdk-jdk".into(),
            vcs: VcsKind::Git,
            url: "ignored".into(),
            branch: None,
        };
        let codeline = Codeline::new(&definition, &settings);

        fs::create_dir_all(codeline.source_dir().join("src"))?;
        fs::create_dir_all(codeline.dir().join("output-stale"))?;
        fs::write(codeline.dir().join("leftover.log"), "x")?;

        codeline.bootstrap(&[], true)?;

        assert!(codeline.source_dir().join("src").is_dir());
        assert!(!codeline.dir().join("output-stale").exists());
        assert!(!codeline.dir().join("leftover.log").exists());

        Ok(())
    }

    #[test]
    fn removal_outside_root_is_refused() {
        let settings = test_settings(Path::new("/tmp/treeline-root"));
        let definition = CodelineDefinition::default();
        let codeline = Codeline::new(&definition, &settings);

        let result = codeline.remove_path_safe(Path::new("/etc/passwd"));
        assert!(matches!(
            result,
            Err(CodelineError::UnsafeRemoval { .. })
        ));

        let result = codeline.remove_path_safe(Path::new("/tmp/treeline-root"));
        assert!(matches!(
            result,
            Err(CodelineError::UnsafeRemoval { .. })
        ));
    }

    #[sealed_test]
    fn bootstrap_is_idempotent() -> anyhow::Result<()> {
        let root = std::env::current_dir()?.join("root");
        let settings = test_settings(&root);
        let definition = CodelineDefinition {
            name: "line".into(),
            vcs: VcsKind::Git,
            url: "ignored".into(),
            branch: None,
        };
        let codeline = Codeline::new(&definition, &settings);
        fs::create_dir_all(codeline.source_dir())?;

        let variants = vec![BuildVariant {
            name: "fastdebug".into(),
            configure_options: vec![],
        }];
        codeline.bootstrap(&variants, false)?;
        let first = fs::read_to_string(codeline.dir().join("run-all-configure.sh"))?;
        codeline.bootstrap(&variants, false)?;
        let second = fs::read_to_string(codeline.dir().join("run-all-configure.sh"))?;
        assert_eq!(first, second);

        Ok(())
    }
}
