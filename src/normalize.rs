// SPDX-License-Identifier: MIT

//! Line-block normalization passes.
//!
//! Every pass in this module is a pure transformation over an in-memory
//! sequence of lines. Reading a file into lines, deciding whether the result
//! should be written back, and writing it are the caller's concern (see
//! [`crate::source`]). Keeping the passes free of I/O makes each of them
//! trivially testable and individually idempotent.
//!
//! # Passes
//!
//! Four independent passes exist, mirroring the hotspot style rules they
//! enforce:
//!
//! 1. [`reorder_include_block`] — sort the include block alphabetically,
//!    drop blank lines inside it, and keep the precompiled header pinned
//!    first in translation units.
//! 2. [`squash_blank_lines`] — collapse runs of blank lines into one.
//! 3. [`normalize_whitespace`] — strip trailing whitespace, expand tabs to
//!    two spaces, and put a space between loop keywords and `(`.
//! 4. [`rewrite_include_guard`] — rewrite the include guard triple of a
//!    header to the canonical path-derived name.
//!
//! # Failure Model
//!
//! A pass either succeeds with a new line sequence or fails with a
//! [`PassError`] describing the structural precondition that did not hold.
//! A failing pass never returns a partially transformed sequence. The
//! [`normalize`] driver runs every enabled pass regardless of earlier
//! failures and collects them into a [`Report`]; the caller is expected to
//! suppress file output entirely when any failure is present.

use std::path::{Path, PathBuf};

/// The include line pinned to the top of every translation unit.
pub const PRECOMPILED_INCLUDE: &str = "#include \"precompiled.hpp\"";

/// Default anchor directory used to derive include guard names.
pub const DEFAULT_GUARD_ANCHOR: &str = "src/hotspot";

/// Classification of a source file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A compilable source file (`.cpp`, `.c`).
    TranslationUnit,

    /// An included interface file (`.hpp`, `.h`).
    Header,
}

impl SourceKind {
    /// Classify a path by its extension.
    ///
    /// Returns [`None`] for files this tool has no business touching.
    pub fn classify(path: impl AsRef<Path>) -> Option<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("cpp" | "c") => Some(Self::TranslationUnit),
            Some("hpp" | "h") => Some(Self::Header),
            _ => None,
        }
    }

    pub fn is_translation_unit(&self) -> bool {
        matches!(self, Self::TranslationUnit)
    }
}

/// Selection of normalization passes to run.
///
/// Each flag maps to one pass. Passes are independent; enabling one never
/// implies another.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Passes {
    pub include_blocks: bool,
    pub include_guards: bool,
    pub whitespace: bool,
    pub squash_blank_lines: bool,
}

impl Passes {
    /// Enable every pass.
    pub fn all() -> Self {
        Self {
            include_blocks: true,
            include_guards: true,
            whitespace: true,
            squash_blank_lines: true,
        }
    }

    /// True if no pass is enabled.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of running a set of passes over one file's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// The transformed line sequence. Passes that failed left no trace here.
    pub lines: Vec<String>,

    /// Failures of individual passes, in pass order.
    pub failures: Vec<PassError>,
}

impl Report {
    /// True if every enabled pass succeeded structurally.
    pub fn clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run all enabled passes over `lines`.
///
/// Passes run in a fixed order: include blocks, blank-line squashing,
/// whitespace, include guards. A failing pass leaves the working sequence
/// exactly as it was before that pass and is recorded in the report; later
/// passes still run. The guard pass only applies to headers and is skipped
/// silently for translation units.
pub fn normalize(
    lines: &[String],
    kind: SourceKind,
    path: impl AsRef<Path>,
    anchor: &str,
    passes: &Passes,
) -> Report {
    let mut work = lines.to_vec();
    let mut failures = Vec::new();

    if passes.include_blocks {
        match reorder_include_block(&work, kind) {
            Ok(next) => work = next,
            Err(err) => failures.push(err),
        }
    }

    if passes.squash_blank_lines {
        work = squash_blank_lines(&work);
    }

    if passes.whitespace {
        work = normalize_whitespace(&work);
    }

    if passes.include_guards && !kind.is_translation_unit() {
        match rewrite_include_guard(&work, path.as_ref(), anchor) {
            Ok(next) => work = next,
            Err(err) => failures.push(err),
        }
    }

    Report {
        lines: work,
        failures,
    }
}

/// Inclusive line-number boundaries of the first include block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IncludeBlock {
    first: usize,
    last: usize,
}

/// Locate the first include block of a file.
///
/// The block starts at the first line whose trimmed content begins with
/// `#include`, extends through further include or blank lines, and ends at
/// the last include line before the first non-blank non-include line.
fn find_include_block(lines: &[String]) -> Option<IncludeBlock> {
    let mut block: Option<IncludeBlock> = None;
    for (line_no, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        match block.as_mut() {
            None => {
                if trimmed.starts_with("#include") {
                    block = Some(IncludeBlock {
                        first: line_no,
                        last: line_no,
                    });
                }
            }
            Some(found) => {
                if trimmed.starts_with("#include") {
                    found.last = line_no;
                } else if !trimmed.is_empty() {
                    // First real code line ends the block.
                    break;
                }
            }
        }
    }

    block
}

/// Sort the include block and pin the precompiled header first.
///
/// Blank lines inside the block are dropped, the remaining include lines are
/// sorted byte-wise on their full text, and the result is spliced back at
/// the original block boundaries. For translation units the literal
/// [`PRECOMPILED_INCLUDE`] line must come first in the block; it is excluded
/// from the sort and re-inserted at position zero.
///
/// # Errors
///
/// - [`PassError::MissingIncludeBlock`] if a translation unit has no include
///   line at all.
/// - [`PassError::MisplacedPrecompiledHeader`] if a translation unit's block
///   does not start with the precompiled header include.
pub fn reorder_include_block(lines: &[String], kind: SourceKind) -> Result<Vec<String>> {
    let Some(block) = find_include_block(lines) else {
        // Headers without includes are fine; translation units are not.
        return if kind.is_translation_unit() {
            Err(PassError::MissingIncludeBlock)
        } else {
            Ok(lines.to_vec())
        };
    };

    let mut includes = lines[block.first..=block.last].to_vec();

    let pinned = if kind.is_translation_unit() {
        if includes[0].trim() != PRECOMPILED_INCLUDE {
            return Err(PassError::MisplacedPrecompiledHeader {
                found: includes[0].clone(),
            });
        }
        Some(includes.remove(0))
    } else {
        None
    };

    includes.retain(|line| !line.trim().is_empty());
    includes.sort();

    if let Some(pinned) = pinned {
        includes.insert(0, pinned);
    }

    let mut out = Vec::with_capacity(lines.len());
    out.extend_from_slice(&lines[..block.first]);
    out.append(&mut includes);
    out.extend_from_slice(&lines[block.last + 1..]);

    Ok(out)
}

/// Collapse every run of two or more blank lines into a single blank line.
///
/// A line is blank if it is empty after trimming. The first line of each run
/// survives verbatim.
pub fn squash_blank_lines(lines: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut in_blank_run = false;
    for line in lines {
        if line.trim().is_empty() {
            if !in_blank_run {
                out.push(line.clone());
                in_blank_run = true;
            }
        } else {
            out.push(line.clone());
            in_blank_run = false;
        }
    }

    out
}

/// Fix the usual whitespace offences, line by line.
///
/// Strips trailing whitespace, expands each tab to two spaces, and inserts a
/// space between `for`/`while` and an immediately following `(`. The keyword
/// fix is a plain textual substitution, not syntax-aware; it can misfire
/// inside string or comment literals. That is a known, accepted limitation
/// of the tool and deliberately not corrected here.
pub fn normalize_whitespace(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            line.trim_end()
                .replace('\t', "  ")
                .replace(" for(", " for (")
                .replace(" while(", " while (")
        })
        .collect()
}

/// Derive the canonical include guard name for a header path.
///
/// The name is the path suffix after the `anchor` directory segment,
/// upper-cased, with dots and path separators replaced by underscores. It is
/// a pure function of the path, which is what makes guard rewriting
/// idempotent.
///
/// # Errors
///
/// - [`PassError::UndeterminableGuardName`] if the path does not contain the
///   anchor segment.
pub fn guard_name(path: impl AsRef<Path>, anchor: &str) -> Result<String> {
    let path = path.as_ref();
    let haystack = path.to_string_lossy();
    let needle = format!("/{}/", anchor.trim_matches('/'));

    let Some(index) = haystack.find(&needle) else {
        return Err(PassError::UndeterminableGuardName {
            path: path.to_path_buf(),
        });
    };

    let suffix = &haystack[index + needle.len()..];
    Ok(suffix.to_uppercase().replace(['.', '/'], "_"))
}

/// Rewrite the include guard triple of a header to canonical form.
///
/// Scans for the first `#ifndef ` line and requires the very next line to be
/// a `#define`. The closing line is the last top-level `#endif` after the
/// define; the candidate is invalidated whenever non-blank content follows
/// it, so only an `#endif` with nothing but blank lines after it survives.
/// Exactly the three identified lines are rewritten to `#ifndef NAME`,
/// `#define NAME`, and `#endif // NAME`; everything else is untouched.
///
/// Files with multiple or nested top-level conditionals do not fit this
/// single-pass shape and fail rather than being guessed at.
///
/// # Errors
///
/// - [`PassError::UndeterminableGuardName`] if no guard name can be derived
///   from the path.
/// - [`PassError::MalformedIncludeGuard`] if the open/define/close triple
///   cannot be identified.
pub fn rewrite_include_guard(
    lines: &[String],
    path: impl AsRef<Path>,
    anchor: &str,
) -> Result<Vec<String>> {
    let name = guard_name(path, anchor)?;

    let mut open_line = None;
    let mut define_line = None;
    let mut close_line = None;
    for (line_no, line) in lines.iter().enumerate() {
        if open_line.is_none() {
            if line.starts_with("#ifndef ") {
                open_line = Some(line_no);
            }
        } else if define_line.is_none() {
            if !line.trim().starts_with("#define") {
                return Err(PassError::MalformedIncludeGuard);
            }
            define_line = Some(line_no);
        } else if line.starts_with("#endif") {
            close_line = Some(line_no);
        } else if !line.trim().is_empty() {
            // Content after an #endif means it was not the guard's close.
            close_line = None;
        }
    }

    let (Some(open), Some(define), Some(close)) = (open_line, define_line, close_line) else {
        return Err(PassError::MalformedIncludeGuard);
    };

    let mut out = lines.to_vec();
    out[open] = format!("#ifndef {name}");
    out[define] = format!("#define {name}");
    out[close] = format!("#endif // {name}");

    Ok(out)
}

/// Structural precondition failures of individual passes.
///
/// These are the only failure class the normalizer knows. None of them is
/// fatal to a batch run; the caller reports them per file and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    /// Translation unit with no include line at all.
    #[error("no include block found in translation unit")]
    MissingIncludeBlock,

    /// Translation unit whose include block does not start with the
    /// precompiled header.
    #[error("expected `#include \"precompiled.hpp\"` as first include, found {found:?}")]
    MisplacedPrecompiledHeader { found: String },

    /// Header whose guard triple cannot be identified.
    #[error("malformed include guard")]
    MalformedIncludeGuard,

    /// Header path without the anchor segment to derive a guard name from.
    #[error("cannot derive include guard name from {path:?}")]
    UndeterminableGuardName { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PassError> = std::result::Result<T, E>;
