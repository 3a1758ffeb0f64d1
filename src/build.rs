// SPDX-License-Identifier: MIT

//! Build variant orchestration.
//!
//! Runs a sequence of configure/make builds for one codeline. The configure
//! script and make are external collaborators; this module only prepares
//! directories, lines up option strings, and invokes them in order.
//!
//! Build steps stream their output straight to the terminal. Unlike the
//! best-effort tidy batch, a failing build step aborts the run: later
//! variants of the same invocation are almost never worth the wait once one
//! configuration is broken.

use crate::{
    codeline::Codeline,
    config::{BuildVariant, CodelineDefinition, TreeConfig, VcsKind},
    syscall,
};

use std::path::PathBuf;
use tracing::info;

/// Build mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Configure, `make clean`, then build the target.
    #[default]
    Full,

    /// Build the target only, skipping configure and clean.
    Incremental,
}

/// One build invocation: a codeline plus mode and make target.
#[derive(Debug)]
pub struct BuildRun<'a> {
    config: &'a TreeConfig,
    definition: &'a CodelineDefinition,
    codeline: Codeline<'a>,
    mode: BuildMode,
    target: String,
}

impl<'a> BuildRun<'a> {
    /// Set up a build run for a named codeline.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::UnknownCodeline`] if the name is not in the
    ///   configured codeline table.
    /// - Return [`BuildError::MissingSources`] if the codeline has no
    ///   checkout to build from.
    pub fn new(
        config: &'a TreeConfig,
        codeline_name: impl AsRef<str>,
        mode: BuildMode,
        target: impl Into<String>,
    ) -> Result<Self> {
        let definition =
            config
                .codeline(codeline_name.as_ref())
                .ok_or_else(|| BuildError::UnknownCodeline {
                    name: codeline_name.as_ref().to_owned(),
                })?;
        let codeline = Codeline::new(definition, &config.tree);

        if !codeline.source_dir().exists() {
            return Err(BuildError::MissingSources {
                path: codeline.source_dir(),
            });
        }

        Ok(Self {
            config,
            definition,
            codeline,
            mode,
            target: target.into(),
        })
    }

    /// Resolve requested variant names against the configured table.
    ///
    /// An empty request or the name `all` selects every configured variant.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::UnknownVariant`] for a name not in the table.
    pub fn resolve_variants(&self, names: &[String]) -> Result<Vec<&'a BuildVariant>> {
        if names.is_empty() || names.iter().any(|name| name == "all") {
            return Ok(self.config.variants.iter().collect());
        }

        names
            .iter()
            .map(|name| {
                self.config
                    .variant(name)
                    .ok_or_else(|| BuildError::UnknownVariant { name: name.clone() })
            })
            .collect()
    }

    /// Build the requested variants in order.
    ///
    /// # Errors
    ///
    /// - Return [`BuildError::UnknownVariant`] before any build step runs.
    /// - Return [`BuildError::PatchQueueUnsupported`] for `qpop` on a
    ///   non-Mercurial codeline.
    /// - Return [`BuildError::Syscall`] for the first failing external
    ///   command; nothing after it is attempted.
    pub fn run(&self, variant_names: &[String], pull: bool, qpop: bool) -> Result<()> {
        let variants = self.resolve_variants(variant_names)?;

        if qpop {
            self.pop_patch_queue()?;
        }
        if pull {
            self.pull_upstream()?;
        }

        for variant in variants {
            self.build_variant(variant)?;
        }

        Ok(())
    }

    /// Pop all applied mq patches before pulling or building.
    ///
    /// Refuses on uncommitted changes; popping would discard them.
    fn pop_patch_queue(&self) -> Result<()> {
        let source = self.codeline.source_dir().to_string_lossy().into_owned();
        match self.definition.vcs {
            VcsKind::Git => Err(BuildError::PatchQueueUnsupported),
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                let diff = syscall::captured("hg", ["-R", source.as_str(), "diff"])?;
                if !diff.is_empty() {
                    return Err(BuildError::DirtyWorkspace);
                }
                info!("popping applied mq patches");
                syscall::captured("hg", ["-R", source.as_str(), "qpop", "-a"])?;
                Ok(())
            }
        }
    }

    /// Pull upstream changes into the checkout before building.
    ///
    /// Refuses to pull over uncommitted changes; a dirty workspace mixed
    /// with an upstream merge is exactly the mess this check exists for.
    fn pull_upstream(&self) -> Result<()> {
        let source = self.codeline.source_dir().to_string_lossy().into_owned();
        match self.definition.vcs {
            VcsKind::Git => {
                let diff = syscall::captured("git", ["-C", source.as_str(), "diff"])?;
                if !diff.is_empty() {
                    return Err(BuildError::DirtyWorkspace);
                }
                info!("pulling upstream changes");
                syscall::interactive("git", ["-C", source.as_str(), "pull"])?;
            }
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                let diff = syscall::captured("hg", ["-R", source.as_str(), "diff"])?;
                if !diff.is_empty() {
                    return Err(BuildError::DirtyWorkspace);
                }
                info!("pulling upstream changes");
                syscall::interactive("hg", ["-R", source.as_str(), "pull", "-u"])?;
            }
        }

        Ok(())
    }

    /// Run one variant's build steps inside its output directory.
    fn build_variant(&self, variant: &BuildVariant) -> Result<()> {
        let output_dir = self.codeline.output_dir(variant);
        mkdirp::mkdirp(&output_dir).map_err(|err| BuildError::Io {
            source: err,
            path: output_dir.clone(),
        })?;

        if self.mode == BuildMode::Full {
            info!("configuring variant {}", variant.name);
            let mut configure = vec!["../source/configure".to_owned()];
            configure.extend(self.codeline.standard_configure_options());
            configure.extend(variant.configure_options.iter().cloned());
            syscall::interactive_in(&output_dir, "bash", configure)?;
            syscall::interactive_in(&output_dir, "make", ["clean"])?;
        }

        info!("building {} in variant {}", self.target, variant.name);
        syscall::interactive_in(&output_dir, "make", [self.target.as_str()])?;

        Ok(())
    }
}

/// Build orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Codeline name not present in the configuration.
    #[error("unknown codeline {name:?}")]
    UnknownCodeline { name: String },

    /// Variant name not present in the configuration.
    #[error("unknown build variant {name:?}")]
    UnknownVariant { name: String },

    /// Codeline has no checkout to build.
    #[error("no sources at {}; run `treeline setup` first", path.display())]
    MissingSources { path: PathBuf },

    /// Uncommitted changes block a pull-before-build.
    #[error("uncommitted changes in the workspace; commit or revert before --pull")]
    DirtyWorkspace,

    /// Patch queues are a Mercurial feature.
    #[error("--qpop needs a mercurial codeline; this one uses git")]
    PatchQueueUnsupported,

    /// Output directory preparation failed.
    #[error("failed to prepare build directory {}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// An external build step failed.
    #[error(transparent)]
    Syscall(#[from] syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = BuildError> = std::result::Result<T, E>;
