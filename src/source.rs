// SPDX-License-Identifier: MIT

//! Source file discovery and per-file tidy orchestration.
//!
//! This is the I/O side of the normalizer: decide which files to touch, read
//! them into line sequences, hand those to [`crate::normalize`], and write
//! the result back when something actually changed.
//!
//! # Batch Semantics
//!
//! A tidy run is best-effort. A file whose structural preconditions do not
//! hold is reported with a single diagnostic and left byte-identical on
//! disk; the run continues with the next file and the process exit status is
//! unaffected. Only a nonexistent input path aborts the whole run, since
//! that points at a typo rather than at an iffy file.
//!
//! Files are processed strictly one at a time, each read, transformed, and
//! (maybe) written before the next one is considered.

use crate::normalize::{normalize, Passes, SourceKind, DEFAULT_GUARD_ANCHOR};

use ignore::WalkBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// One source file loaded into memory.
///
/// Keeps enough of the on-disk shape around (line terminator convention,
/// presence of a trailing terminator) to write the file back without
/// gratuitous byte churn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    kind: SourceKind,
    lines: Vec<String>,
    crlf: bool,
    trailing_newline: bool,
}

impl SourceFile {
    /// Read a source file from disk and split it into lines.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::UnsupportedExtension`] if the path is not a
    ///   translation unit or header.
    /// - Return [`SourceError::Read`] if the file cannot be read.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let Some(kind) = SourceKind::classify(&path) else {
            return Err(SourceError::UnsupportedExtension { path });
        };

        let content = fs::read_to_string(&path).map_err(|err| SourceError::Read {
            source: err,
            path: path.clone(),
        })?;

        Ok(Self {
            kind,
            lines: content.lines().map(str::to_owned).collect(),
            crlf: content.contains("\r\n"),
            trailing_newline: content.ends_with('\n'),
            path,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Render a line sequence using this file's terminator convention.
    fn render(&self, lines: &[String]) -> String {
        let newline = if self.crlf { "\r\n" } else { "\n" };
        let mut out = lines.join(newline);
        if self.trailing_newline && !lines.is_empty() {
            out.push_str(newline);
        }

        out
    }

    /// Overwrite the file in place with a new line sequence.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::Write`] if the file cannot be written.
    pub fn write(&self, lines: &[String]) -> Result<()> {
        fs::write(&self.path, self.render(lines)).map_err(|err| SourceError::Write {
            source: err,
            path: self.path.clone(),
        })
    }
}

/// Resolve the file arguments of a tidy run into a flat list of sources.
///
/// Explicit files are kept only when they classify as a translation unit or
/// header; directories are recursed only when `recursive` is set, with every
/// standard walk filter disabled so hidden files are seen too. The result is
/// sorted for a deterministic processing order.
///
/// # Errors
///
/// - Return [`SourceError::NotFound`] if an argument does not exist at all.
pub fn discover(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(SourceError::NotFound { path: path.clone() });
        }

        if path.is_dir() {
            if !recursive {
                debug!("skipping directory {} (no --recursive)", path.display());
                continue;
            }
            for entry in WalkBuilder::new(path).standard_filters(false).build() {
                let entry = entry?;
                let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                if is_file && SourceKind::classify(entry.path()).is_some() {
                    files.push(entry.into_path());
                }
            }
        } else if SourceKind::classify(path).is_some() {
            files.push(path.clone());
        } else {
            debug!("skipping {}: not a source or header file", path.display());
        }
    }

    files.sort();
    Ok(files)
}

/// Collect the touched source files out of a unified diff.
///
/// Reads the `+++ b/<path>` target lines of a patch file, keeping only paths
/// that classify as sources or headers. Paths are returned as written in the
/// patch, relative to whatever tree the patch applies to.
///
/// # Errors
///
/// - Return [`SourceError::Read`] if the patch file cannot be read.
pub fn files_from_patch(patch: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let patch = patch.as_ref();
    let content = fs::read_to_string(patch).map_err(|err| SourceError::Read {
        source: err,
        path: patch.to_path_buf(),
    })?;

    let files = content
        .lines()
        .filter_map(|line| line.strip_prefix("+++ b/"))
        .map(|target| PathBuf::from(target.trim_end()))
        .filter(|target| SourceKind::classify(target).is_some())
        .collect();

    Ok(files)
}

/// What happened to a single file during a tidy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TidyOutcome {
    /// All passes succeeded and nothing needed changing.
    Unchanged,

    /// The file was rewritten in place.
    Fixed,

    /// Dry run: the file would have been rewritten.
    WouldFix,

    /// A structural precondition failed; the file was left untouched.
    Unclear,
}

/// Aggregate counts over one tidy batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TidySummary {
    pub fixed: usize,
    pub unchanged: usize,
    pub unclear: usize,
    pub errors: usize,
}

/// Settings for one tidy run over a set of files.
#[derive(Debug, Clone)]
pub struct TidyRun {
    passes: Passes,
    guard_anchor: String,
    dry_run: bool,
}

impl TidyRun {
    /// Construct a tidy run with the default guard anchor.
    pub fn new(passes: Passes, dry_run: bool) -> Self {
        Self {
            passes,
            guard_anchor: DEFAULT_GUARD_ANCHOR.to_owned(),
            dry_run,
        }
    }

    /// Override the anchor directory used to derive include guard names.
    pub fn with_guard_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.guard_anchor = anchor.into();
        self
    }

    /// Tidy a single file.
    ///
    /// The guard pass needs the file's absolute path to derive the guard
    /// name, so relative inputs are resolved against the current directory
    /// first.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::UnsupportedExtension`], [`SourceError::Read`],
    ///   or [`SourceError::Write`] for the respective I/O failures. Pass
    ///   failures are not errors; they show up as [`TidyOutcome::Unclear`].
    pub fn apply(&self, path: &Path) -> Result<TidyOutcome> {
        let file = SourceFile::read(path)?;
        debug!("processing {} ({} lines)", path.display(), file.lines().len());

        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let report = normalize(
            file.lines(),
            file.kind(),
            &absolute,
            &self.guard_anchor,
            &self.passes,
        );

        if !report.clean() {
            for failure in &report.failures {
                debug!("{}: {}", path.display(), failure);
            }
            warn!("{}: unclear, please fix manually", path.display());
            return Ok(TidyOutcome::Unclear);
        }

        if report.lines == file.lines() {
            debug!("{}: already clean", path.display());
            return Ok(TidyOutcome::Unchanged);
        }

        if self.dry_run {
            info!("would fix {} (dry run, nothing written)", path.display());
            return Ok(TidyOutcome::WouldFix);
        }

        info!("fixing {}", path.display());
        file.write(&report.lines)?;

        Ok(TidyOutcome::Fixed)
    }

    /// Tidy a batch of files, one at a time.
    ///
    /// I/O errors on individual files are logged and counted but never abort
    /// the batch, matching the best-effort semantics of the run as a whole.
    pub fn run(&self, files: &[PathBuf]) -> TidySummary {
        let mut summary = TidySummary::default();
        for path in files {
            match self.apply(path) {
                Ok(TidyOutcome::Fixed) | Ok(TidyOutcome::WouldFix) => summary.fixed += 1,
                Ok(TidyOutcome::Unchanged) => summary.unchanged += 1,
                Ok(TidyOutcome::Unclear) => summary.unclear += 1,
                Err(err) => {
                    warn!("{err}");
                    summary.errors += 1;
                }
            }
        }

        summary
    }
}

/// Source discovery and file I/O error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Input path given on the command line does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Path is neither a translation unit nor a header.
    #[error("not a source or header file: {}", path.display())]
    UnsupportedExtension { path: PathBuf },

    /// File cannot be read.
    #[error("failed to read {}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be written back.
    #[error("failed to write {}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory walk failed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn discover_filters_and_recurses() -> anyhow::Result<()> {
        fs::create_dir_all("tree/sub")?;
        fs::write("tree/a.cpp", "")?;
        fs::write("tree/sub/b.hpp", "")?;
        fs::write("tree/notes.txt", "")?;
        fs::write("top.c", "")?;

        let result = discover(&["tree".into(), "top.c".into()], true)?;
        let expect: Vec<PathBuf> =
            vec!["top.c".into(), "tree/a.cpp".into(), "tree/sub/b.hpp".into()];
        assert_eq!(result, expect);

        // Without --recursive a directory argument contributes nothing.
        let result = discover(&["tree".into(), "top.c".into()], false)?;
        assert_eq!(result, vec![PathBuf::from("top.c")]);

        Ok(())
    }

    #[sealed_test]
    fn discover_rejects_missing_paths() {
        let result = discover(&["no-such-file.cpp".into()], false);
        assert!(matches!(result, Err(SourceError::NotFound { .. })));
    }

    #[sealed_test]
    fn files_from_patch_collects_targets() -> anyhow::Result<()> {
        fs::write(
            "change.patch",
            indoc! {"
                diff --git a/src/hotspot/share/runtime/os.cpp b/src/hotspot/share/runtime/os.cpp
                --- a/src/hotspot/share/runtime/os.cpp
                +++ b/src/hotspot/share/runtime/os.cpp
                @@ -1 +1 @@
                +++ b/src/hotspot/share/runtime/os.hpp
                +++ b/make/Main.gmk
            "},
        )?;

        let result = files_from_patch("change.patch")?;
        let expect: Vec<PathBuf> = vec![
            "src/hotspot/share/runtime/os.cpp".into(),
            "src/hotspot/share/runtime/os.hpp".into(),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn apply_rewrites_a_messy_translation_unit() -> anyhow::Result<()> {
        let input = indoc! {r#"
            #include "precompiled.hpp"
            #include "b.hpp"

            #include "a.hpp"

            code();
        "#};
        fs::write("messy.cpp", input)?;

        let run = TidyRun::new(Passes::all(), false);
        let outcome = run.apply(Path::new("messy.cpp"))?;
        assert_eq!(outcome, TidyOutcome::Fixed);

        let result = fs::read_to_string("messy.cpp")?;
        let expect = indoc! {r#"
            #include "precompiled.hpp"
            #include "a.hpp"
            #include "b.hpp"

            code();
        "#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn apply_leaves_failing_files_byte_identical() -> anyhow::Result<()> {
        // First include is not the precompiled header, so the include pass
        // fails and output is suppressed even though squashing would have
        // changed the file.
        let input = "#include \"b.hpp\"\n\n\n\ncode();\n";
        fs::write("iffy.cpp", input)?;

        let run = TidyRun::new(Passes::all(), false);
        let outcome = run.apply(Path::new("iffy.cpp"))?;
        assert_eq!(outcome, TidyOutcome::Unclear);
        assert_eq!(fs::read_to_string("iffy.cpp")?, input);

        Ok(())
    }

    #[sealed_test]
    fn apply_honors_dry_run() -> anyhow::Result<()> {
        let input = "code();\n\n\n\nmore();\n";
        fs::write("blanks.c", input)?;

        let run = TidyRun::new(Passes::all(), true);
        let outcome = run.apply(Path::new("blanks.c"))?;
        assert_eq!(outcome, TidyOutcome::WouldFix);
        assert_eq!(fs::read_to_string("blanks.c")?, input);

        Ok(())
    }

    #[sealed_test]
    fn apply_preserves_crlf_line_endings() -> anyhow::Result<()> {
        fs::write("dos.c", "code();\r\n\r\n\r\nmore();\r\n")?;

        let run = TidyRun::new(Passes::all(), false);
        run.apply(Path::new("dos.c"))?;

        assert_eq!(fs::read_to_string("dos.c")?, "code();\r\n\r\nmore();\r\n");

        Ok(())
    }

    #[sealed_test]
    fn guard_pass_sees_the_absolute_path() -> anyhow::Result<()> {
        fs::create_dir_all("src/hotspot/share/runtime")?;
        fs::write(
            "src/hotspot/share/runtime/os.hpp",
            indoc! {"
                #ifndef STALE
                #define STALE
                class os;
                #endif
            "},
        )?;

        let run = TidyRun::new(Passes::all(), false);
        let outcome = run.apply(Path::new("src/hotspot/share/runtime/os.hpp"))?;
        assert_eq!(outcome, TidyOutcome::Fixed);

        let result = fs::read_to_string("src/hotspot/share/runtime/os.hpp")?;
        let expect = indoc! {"
            #ifndef SHARE_RUNTIME_OS_HPP
            #define SHARE_RUNTIME_OS_HPP
            class os;
            #endif // SHARE_RUNTIME_OS_HPP
        "};
        assert_eq!(result, expect);

        Ok(())
    }
}
