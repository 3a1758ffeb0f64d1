// SPDX-License-Identifier: MIT

//! End-to-end tidy runs over a small on-disk tree.

use treeline::{
    normalize::Passes,
    source::{discover, TidyRun, TidySummary},
};

use indoc::indoc;
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{collections::BTreeMap, fs, path::Path};

/// Lay down a miniature hotspot-style tree and return its file contents.
fn plant_tree() -> anyhow::Result<()> {
    fs::create_dir_all("src/hotspot/share/runtime")?;

    fs::write(
        "src/hotspot/share/runtime/os.cpp",
        indoc! {r#"
            #include "precompiled.hpp"
            #include "runtime/os.hpp"

            #include "logging/log.hpp"


            void os::init() {
            	for(int i = 0; i < 3; i++) {}
            }
        "#},
    )?;

    fs::write(
        "src/hotspot/share/runtime/os.hpp",
        indoc! {"
            #ifndef RUNTIME_OS_WRONG
            #define RUNTIME_OS_WRONG

            class os;

            #endif
        "},
    )?;

    // First include is not the precompiled header: structurally iffy.
    fs::write(
        "src/hotspot/share/runtime/osThread.cpp",
        indoc! {r#"
            #include "runtime/osThread.hpp"

            void nop();
        "#},
    )?;

    Ok(())
}

fn snapshot(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut contents = BTreeMap::new();
    for path in discover(&[dir.to_path_buf()], true)? {
        contents.insert(
            path.to_string_lossy().into_owned(),
            fs::read_to_string(&path)?,
        );
    }

    Ok(contents)
}

#[sealed_test]
fn tidy_batch_fixes_clean_files_and_skips_iffy_ones() -> anyhow::Result<()> {
    plant_tree()?;

    let files = discover(&["src".into()], true)?;
    assert_eq!(files.len(), 3);

    let run = TidyRun::new(Passes::all(), false);
    let summary = run.run(&files);
    assert_eq!(
        summary,
        TidySummary {
            fixed: 2,
            unchanged: 0,
            unclear: 1,
            errors: 0,
        }
    );

    let result = fs::read_to_string("src/hotspot/share/runtime/os.cpp")?;
    let expect = indoc! {r#"
        #include "precompiled.hpp"
        #include "logging/log.hpp"
        #include "runtime/os.hpp"

        void os::init() {
          for (int i = 0; i < 3; i++) {}
        }
    "#};
    assert_eq!(result, expect);

    let result = fs::read_to_string("src/hotspot/share/runtime/os.hpp")?;
    let expect = indoc! {"
        #ifndef SHARE_RUNTIME_OS_HPP
        #define SHARE_RUNTIME_OS_HPP

        class os;

        #endif // SHARE_RUNTIME_OS_HPP
    "};
    assert_eq!(result, expect);

    // The iffy file was left byte-identical.
    let untouched = fs::read_to_string("src/hotspot/share/runtime/osThread.cpp")?;
    assert!(untouched.starts_with("#include \"runtime/osThread.hpp\""));

    Ok(())
}

#[sealed_test]
fn tidy_batch_is_idempotent() -> anyhow::Result<()> {
    plant_tree()?;
    let files = discover(&["src".into()], true)?;
    let run = TidyRun::new(Passes::all(), false);

    run.run(&files);
    let after_first = snapshot(Path::new("src"))?;

    let summary = run.run(&files);
    let after_second = snapshot(Path::new("src"))?;

    assert_eq!(after_first, after_second);
    assert_eq!(summary.fixed, 0);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(summary.unclear, 1);

    Ok(())
}

#[sealed_test]
fn dry_run_leaves_the_tree_alone() -> anyhow::Result<()> {
    plant_tree()?;
    let before = snapshot(Path::new("src"))?;

    let files = discover(&["src".into()], true)?;
    let run = TidyRun::new(Passes::all(), true);
    let summary = run.run(&files);

    assert_eq!(summary.fixed, 2);
    assert_eq!(snapshot(Path::new("src"))?, before);

    Ok(())
}
