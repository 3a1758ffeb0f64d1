// SPDX-License-Identifier: MIT

//! Review artifact export and upload.
//!
//! Packages the outgoing change of a workspace as either a plain patch file
//! or a webrev (an HTML diff review bundle produced by the external webrev
//! script), then optionally rsyncs the whole patch directory to the review
//! host. Layout under the export directory:
//!
//! ```text
//! <export_dir>/<patch_name>/<patch_name>.patch
//! <export_dir>/<patch_name>/webrev_0/
//! <export_dir>/<patch_name>/webrev_1/
//! ...
//! ```
//!
//! Webrevs are numbered review iterations. By default a new export
//! overwrites the highest existing iteration; `next` allocates a fresh
//! number instead. Anything already on disk is only deleted after an
//! interactive confirmation.
//!
//! A delta webrev splits a two-change stack into a reviewable pair: one
//! webrev for the delta on top (the webrev script gets the base revision
//! via `-r`) and one for the full change. The delta lands next to its full
//! counterpart as `webrev_<n>_delta/`.

use crate::{
    config::{ReviewSettings, VcsKind},
    syscall,
};

use inquire::Confirm;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// What kind of review artifact to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A single patch file.
    Patch,

    /// A webrev directory; `next` allocates a new iteration number instead
    /// of overwriting the highest existing one. `delta` additionally
    /// exports a delta webrev against the base of a two-change stack.
    Webrev { next: bool, delta: bool },
}

/// One publish invocation over a workspace.
#[derive(Debug)]
pub struct ReviewRun<'a> {
    settings: &'a ReviewSettings,
    vcs: VcsKind,
    source_dir: PathBuf,
    assume_yes: bool,
}

impl<'a> ReviewRun<'a> {
    pub fn new(
        settings: &'a ReviewSettings,
        vcs: VcsKind,
        source_dir: impl Into<PathBuf>,
        assume_yes: bool,
    ) -> Self {
        Self {
            settings,
            vcs,
            source_dir: source_dir.into(),
            assume_yes,
        }
    }

    /// Export the outgoing change and optionally upload it.
    ///
    /// Returns the path of the exported artifact.
    ///
    /// # Errors
    ///
    /// - Return [`ReviewError::OpenChanges`] if the workspace diff is not
    ///   empty; everything must be committed (or qrefresh'ed) first.
    /// - Return [`ReviewError::MissingExportDir`] if the export directory
    ///   does not exist; its location is a deliberate choice, not something
    ///   to silently invent.
    /// - Return [`ReviewError::Cancelled`] if the user declines to remove a
    ///   pre-existing artifact.
    /// - Return [`ReviewError::WrongOutgoingCount`] if a delta export does
    ///   not sit on a stack of exactly two outgoing changes.
    /// - Return [`ReviewError::UploadNotConfigured`] if an upload was
    ///   requested without an rsync destination in the configuration.
    pub fn publish(
        &self,
        kind: ExportKind,
        name: Option<String>,
        upload: bool,
    ) -> Result<PathBuf> {
        self.ensure_clean_workspace()?;

        if !self.settings.export_dir.exists() {
            return Err(ReviewError::MissingExportDir {
                path: self.settings.export_dir.clone(),
            });
        }

        // A delta export needs the base of the two-change stack; patch
        // names default to the base change's description in that case.
        let base = match kind {
            ExportKind::Webrev { delta: true, .. } => {
                Some(base_change(self.outgoing_changes()?)?)
            }
            _ => None,
        };

        let patch_name = match (name, &base) {
            (Some(name), _) => sanitize_patch_name(&name),
            (None, Some(base)) => sanitize_patch_name(&base.description),
            (None, None) => sanitize_patch_name(&self.derive_patch_name()?),
        };
        info!("patch name is {patch_name}");

        let patch_dir = self.settings.export_dir.join(&patch_name);
        mkdirp::mkdirp(&patch_dir).map_err(|err| io_error(err, &patch_dir))?;

        let exported = match kind {
            ExportKind::Patch => self.export_patch(&patch_dir, &patch_name)?,
            ExportKind::Webrev { next, .. } => {
                let base_rev = base.as_ref().map(|base| base.revision.as_str());
                self.export_webrev(&patch_dir, next, base_rev)?
            }
        };
        info!("created {}", exported.display());

        if upload {
            self.upload(&patch_dir)?;
        }

        Ok(exported)
    }

    /// All changes must be committed before exporting.
    fn ensure_clean_workspace(&self) -> Result<()> {
        let source = self.source_dir.to_string_lossy().into_owned();
        let diff = match self.vcs {
            VcsKind::Git => syscall::captured("git", ["-C", source.as_str(), "diff"])?,
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                syscall::captured("hg", ["-R", source.as_str(), "diff"])?
            }
        };

        if !diff.is_empty() {
            return Err(ReviewError::OpenChanges);
        }

        debug!("no outstanding changes in workspace");
        Ok(())
    }

    /// Derive the patch name from the version control system.
    ///
    /// Mercurial uses the applied patch queue, which must hold exactly one
    /// entry; Git uses the subject of the tip commit.
    fn derive_patch_name(&self) -> Result<String> {
        let source = self.source_dir.to_string_lossy().into_owned();
        match self.vcs {
            VcsKind::Git => Ok(syscall::captured(
                "git",
                ["-C", source.as_str(), "log", "-1", "--pretty=%s"],
            )?),
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                let applied = syscall::captured("hg", ["-R", source.as_str(), "qapplied"])?;
                let mut lines = applied.lines().filter(|line| !line.trim().is_empty());
                match (lines.next(), lines.next()) {
                    (Some(patch), None) => Ok(patch.to_owned()),
                    (None, _) => Err(ReviewError::EmptyQueue),
                    (Some(_), Some(_)) => Err(ReviewError::MultiplePatches),
                }
            }
        }
    }

    fn export_patch(&self, patch_dir: &Path, patch_name: &str) -> Result<PathBuf> {
        let patch_path = patch_dir.join(format!("{patch_name}.patch"));
        if patch_path.exists() {
            self.confirm_removal(&patch_path)?;
            fs::remove_file(&patch_path).map_err(|err| io_error(err, &patch_path))?;
        }

        let source = self.source_dir.to_string_lossy().into_owned();
        match self.vcs {
            VcsKind::Git => {
                let patch = syscall::captured(
                    "git",
                    ["-C", source.as_str(), "format-patch", "-1", "--stdout"],
                )?;
                fs::write(&patch_path, patch + "\n").map_err(|err| io_error(err, &patch_path))?;
            }
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                syscall::captured(
                    "hg",
                    [
                        "-R",
                        source.as_str(),
                        "export",
                        "-o",
                        patch_path.to_string_lossy().as_ref(),
                    ],
                )?;
            }
        }

        Ok(patch_path)
    }

    fn export_webrev(&self, patch_dir: &Path, next: bool, base: Option<&str>) -> Result<PathBuf> {
        let number = pick_webrev_number(patch_dir, next);
        let webrev_path = webrev_dir(patch_dir, number);
        let delta_path = delta_webrev_dir(patch_dir, number);
        if webrev_path.exists() {
            self.confirm_removal(&webrev_path)?;
            fs::remove_dir_all(&webrev_path).map_err(|err| io_error(err, &webrev_path))?;
            // A stale delta of the same iteration goes with it, unasked.
            if delta_path.exists() {
                debug!("removing stale {}", delta_path.display());
                fs::remove_dir_all(&delta_path).map_err(|err| io_error(err, &delta_path))?;
            }
        }

        let script = self.settings.webrev_script.to_string_lossy().into_owned();
        if let Some(base) = base {
            // Delta first: everything on top of the base revision.
            syscall::captured(
                "ksh",
                [
                    script.as_str(),
                    "-o",
                    delta_path.to_string_lossy().as_ref(),
                    "-r",
                    base,
                ],
            )?;
            info!("created delta webrev {}", delta_path.display());
        }

        // The full webrev picks up the whole outgoing stack.
        syscall::captured(
            "ksh",
            [
                script.as_str(),
                "-o",
                webrev_path.to_string_lossy().as_ref(),
            ],
        )?;

        Ok(webrev_path)
    }

    /// List outgoing changes, oldest first.
    ///
    /// Git reads the commits ahead of the upstream branch; Mercurial asks
    /// `hg outgoing`, which reports failure when there is nothing outgoing
    /// at all.
    fn outgoing_changes(&self) -> Result<Vec<OutgoingChange>> {
        let source = self.source_dir.to_string_lossy().into_owned();
        let listed = match self.vcs {
            VcsKind::Git => syscall::captured(
                "git",
                [
                    "-C",
                    source.as_str(),
                    "log",
                    "--reverse",
                    "--pretty=%h\t%s",
                    "@{upstream}..",
                ],
            )?,
            VcsKind::Mercurial | VcsKind::MercurialForest => {
                let result = syscall::captured(
                    "hg",
                    [
                        "-R",
                        source.as_str(),
                        "outgoing",
                        "--template",
                        "{node|short}\t{desc|firstline}\n",
                    ],
                );
                match result {
                    Ok(listed) => listed,
                    Err(syscall::SyscallError::Failed { output, .. })
                        if output.contains("no changes found") =>
                    {
                        String::new()
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        Ok(parse_outgoing(&listed))
    }

    fn confirm_removal(&self, path: &Path) -> Result<()> {
        if self.assume_yes {
            info!("removing pre-existing {} (--yes)", path.display());
            return Ok(());
        }

        let confirmed = Confirm::new(&format!("Remove pre-existing {}?", path.display()))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            return Err(ReviewError::Cancelled);
        }

        Ok(())
    }

    /// Rsync the whole patch directory to the review host.
    ///
    /// Transfers older webrevs along with the new one; rsync only moves
    /// what the remote does not have yet.
    fn upload(&self, patch_dir: &Path) -> Result<()> {
        if self.settings.upload_to.is_empty() {
            return Err(ReviewError::UploadNotConfigured);
        }

        info!("uploading {}", patch_dir.display());
        let output = syscall::captured(
            "rsync",
            [
                "-avz",
                "-e",
                "ssh",
                patch_dir.to_string_lossy().as_ref(),
                self.settings.upload_to.as_str(),
            ],
        )?;
        debug!("{output}");
        info!(
            "uploaded {} to {}",
            patch_dir.display(),
            self.settings.upload_to
        );

        Ok(())
    }
}

/// One outgoing change: a revision and the first line of its description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingChange {
    pub revision: String,
    pub description: String,
}

/// Parse tab-separated revision/description lines out of command output.
///
/// Lines without a tab (the `comparing with ...` chatter `hg outgoing`
/// prints around its template output) are skipped.
fn parse_outgoing(listed: &str) -> Vec<OutgoingChange> {
    listed
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(revision, description)| OutgoingChange {
            revision: revision.trim().to_owned(),
            description: description.trim().to_owned(),
        })
        .collect()
}

/// The base of a delta stack: the older of exactly two outgoing changes.
fn base_change(mut outgoing: Vec<OutgoingChange>) -> Result<OutgoingChange> {
    if outgoing.len() != 2 {
        return Err(ReviewError::WrongOutgoingCount {
            found: outgoing.len(),
        });
    }

    Ok(outgoing.remove(0))
}

/// Reduce a change description to a file-system-safe patch name.
///
/// Anything outside `[A-Za-z0-9._-]` turns into a dash; runs of dashes
/// collapse and leading/trailing dashes are trimmed.
pub fn sanitize_patch_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }

    out.trim_matches('-').to_owned()
}

fn webrev_dir(patch_dir: &Path, number: u32) -> PathBuf {
    patch_dir.join(format!("webrev_{number}"))
}

fn delta_webrev_dir(patch_dir: &Path, number: u32) -> PathBuf {
    patch_dir.join(format!("webrev_{number}_delta"))
}

/// Pick the webrev iteration number to export into.
///
/// Counts existing `webrev_<n>` directories from zero. By default the
/// highest existing iteration is reused (overwritten); `next` selects the
/// first free number instead. With no existing webrev both choices are zero.
fn pick_webrev_number(patch_dir: &Path, next: bool) -> u32 {
    let mut first_free = 0;
    while webrev_dir(patch_dir, first_free).exists() {
        first_free += 1;
    }

    if next || first_free == 0 {
        first_free
    } else {
        first_free - 1
    }
}

fn io_error(source: std::io::Error, path: &Path) -> ReviewError {
    ReviewError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// Review export error types.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// Workspace has uncommitted changes.
    #[error("open changes in the workspace; commit or qrefresh first")]
    OpenChanges,

    /// Mercurial patch queue is empty.
    #[error("mercurial queue is empty; nothing to export")]
    EmptyQueue,

    /// More than one patch applied; the export would mix changes.
    #[error("multiple patches applied; this tool works with exactly one")]
    MultiplePatches,

    /// Delta export over a stack that is not base plus delta.
    #[error("delta webrev needs exactly two outgoing changes (base and delta), found {found}")]
    WrongOutgoingCount { found: usize },

    /// Export directory does not exist.
    #[error("export directory not found: {}", path.display())]
    MissingExportDir { path: PathBuf },

    /// Upload requested but no destination configured.
    #[error("no upload destination configured; set review.upload_to")]
    UploadNotConfigured,

    /// User declined to remove a pre-existing artifact.
    #[error("cancelled")]
    Cancelled,

    /// File system manipulation under the export directory failed.
    #[error("export failed at {}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Interactive confirmation failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// An external command failed.
    #[error(transparent)]
    Syscall(#[from] syscall::SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = ReviewError> = std::result::Result<T, E>;
