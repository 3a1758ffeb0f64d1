// SPDX-License-Identifier: MIT

//! Developer-workflow automation for large C/C++ source trees.
//!
//! Treeline manages multiple checkouts (__codelines__) of one source tree,
//! builds them in several compiler configurations, keeps source files tidy
//! according to the tree's style rules, and packages outgoing changes as
//! patches or webrevs for review.
//!
//! The interesting part lives in [`normalize`]: pure, idempotent
//! line-sequence transformations with positional invariants (sorted include
//! blocks with a pinned precompiled header, canonical include guards,
//! whitespace hygiene). Everything else is deliberately thin glue over
//! external command-line collaborators: the version control clients, the
//! configure/make pair, the webrev script, and rsync.

pub mod build;
pub mod codeline;
pub mod config;
pub mod normalize;
pub mod path;
pub mod review;
pub mod source;
pub mod syscall;
