// SPDX-License-Identifier: MIT

use treeline::{
    build::{BuildMode, BuildRun},
    codeline,
    config::{CodelineDefinition, TreeConfig},
    normalize::Passes,
    path::load_config,
    review::{ExportKind, ReviewRun},
    source::{discover, files_from_patch, TidyRun},
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  treeline [options] <treeline-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config = load_config()?;
        match self.command {
            Command::Tidy(opts) => run_tidy(opts, config),
            Command::Setup(opts) => run_setup(opts, config),
            Command::Build(opts) => run_build(opts, config),
            Command::Publish(opts) => run_publish(opts, config),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Normalize source file formatting in place.
    #[command(override_usage = "treeline tidy [options] [<file>]...")]
    Tidy(TidyOptions),

    /// Bootstrap all configured codeline directories.
    #[command(override_usage = "treeline setup [options]")]
    Setup(SetupOptions),

    /// Run configure/make builds for a codeline.
    #[command(override_usage = "treeline build [options] [<variant>]...")]
    Build(BuildOptions),

    /// Export a patch or webrev and upload it to the review host.
    #[command(override_usage = "treeline publish [options]")]
    Publish(PublishOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TidyOptions {
    /// Files or directories to process.
    #[arg(value_name = "file")]
    pub files: Vec<PathBuf>,

    /// Take the list of files to process from a patch file instead.
    #[arg(long, value_name = "patch")]
    pub from_patch: Option<PathBuf>,

    /// Recurse into directories.
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Squawk but don't leap.
    #[arg(long)]
    pub dry_run: bool,

    /// Fix order of includes in include blocks and remove blank lines.
    #[arg(short = 'i', long)]
    pub include_blocks: bool,

    /// Fix names of include guards.
    #[arg(short = 'g', long)]
    pub include_guards: bool,

    /// Fix whitespace issues.
    #[arg(short = 'w', long)]
    pub whitespace: bool,

    /// Squash multiple blank lines into one.
    #[arg(short = 'n', long)]
    pub squash_blank_lines: bool,

    /// Run all fixes.
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Override the anchor directory for guard name derivation.
    #[arg(long, value_name = "dir")]
    pub guard_anchor: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupOptions {
    /// Clear old codeline dirs of everything but the sources themselves.
    #[arg(short, long)]
    pub clean: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BuildOptions {
    /// Variants to build; empty or "all" builds every configured variant.
    #[arg(value_name = "variant")]
    pub variants: Vec<String>,

    /// Codeline (repository) to build. Defaults to the first configured.
    #[arg(short, long, value_name = "codeline")]
    pub codeline: Option<String>,

    /// Full runs configure + clean + build; incremental skips both.
    #[arg(short, long, value_enum, default_value_t = Mode::Full)]
    pub mode: Mode,

    /// Build target name.
    #[arg(short, long, value_name = "target", default_value = "images")]
    pub target: String,

    /// Pull changes from upstream before building.
    #[arg(long)]
    pub pull: bool,

    /// Pop applied mq patches before building (Mercurial codelines only).
    #[arg(long)]
    pub qpop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Full,
    Incremental,
}

impl From<Mode> for BuildMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => BuildMode::Full,
            Mode::Incremental => BuildMode::Incremental,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    /// Codeline whose workspace to export from. Defaults to the first
    /// configured.
    #[arg(short, long, value_name = "codeline")]
    pub codeline: Option<String>,

    /// Export a patch file instead of a webrev.
    #[arg(short, long)]
    pub patch_mode: bool,

    /// Webrev mode only: allocate the next webrev number instead of
    /// overwriting the highest existing one.
    #[arg(short = 'i', long)]
    pub next_webrev: bool,

    /// Webrev mode only: export a delta webrev pair from a stack of two
    /// outgoing changes (base and delta).
    #[arg(short, long)]
    pub delta: bool,

    /// Override the patch name derived from the change description.
    #[arg(long, value_name = "name")]
    pub name: Option<String>,

    /// Answer yes automatically to all questions.
    #[arg(short, long)]
    pub yes: bool,

    /// Only export; omit the upload.
    #[arg(short, long)]
    pub no_upload: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_tidy(opts: TidyOptions, config: TreeConfig) -> Result<()> {
    let passes = if opts.all {
        Passes::all()
    } else {
        Passes {
            include_blocks: opts.include_blocks,
            include_guards: opts.include_guards,
            whitespace: opts.whitespace,
            squash_blank_lines: opts.squash_blank_lines,
        }
    };
    if passes.is_empty() {
        warn!("no fixes selected; pass -a or any of -i/-g/-w/-n");
        return Ok(());
    }

    let mut files = discover(&opts.files, opts.recursive)?;
    if let Some(patch) = &opts.from_patch {
        files.extend(files_from_patch(patch)?);
    }
    if files.is_empty() {
        bail!("no files to process");
    }

    let anchor = opts
        .guard_anchor
        .unwrap_or_else(|| config.tree.guard_anchor.clone());
    let run = TidyRun::new(passes, opts.dry_run).with_guard_anchor(anchor);
    let summary = run.run(&files);

    info!(
        "{} fixed, {} unchanged, {} unclear, {} errors",
        summary.fixed, summary.unchanged, summary.unclear, summary.errors
    );

    Ok(())
}

fn run_setup(opts: SetupOptions, config: TreeConfig) -> Result<()> {
    codeline::bootstrap_all(&config, opts.clean)?;
    Ok(())
}

fn run_build(opts: BuildOptions, config: TreeConfig) -> Result<()> {
    let name = pick_codeline(opts.codeline.as_deref(), &config)?.name.clone();
    let run = BuildRun::new(&config, name, opts.mode.into(), opts.target)?;
    run.run(&opts.variants, opts.pull, opts.qpop)?;
    Ok(())
}

fn run_publish(opts: PublishOptions, config: TreeConfig) -> Result<()> {
    if opts.patch_mode && opts.next_webrev {
        bail!("option -i|--next-webrev only supported in webrev mode");
    }
    if opts.patch_mode && opts.delta {
        bail!("option -d|--delta only supported in webrev mode");
    }

    let definition = pick_codeline(opts.codeline.as_deref(), &config)?;
    let source_dir = config.tree.root.join(&definition.name).join("source");

    let kind = if opts.patch_mode {
        ExportKind::Patch
    } else {
        ExportKind::Webrev {
            next: opts.next_webrev,
            delta: opts.delta,
        }
    };

    let run = ReviewRun::new(&config.review, definition.vcs, source_dir, opts.yes);
    run.publish(kind, opts.name, !opts.no_upload)?;

    Ok(())
}

fn pick_codeline<'a>(
    requested: Option<&str>,
    config: &'a TreeConfig,
) -> Result<&'a CodelineDefinition> {
    match requested {
        Some(name) => config.codeline(name).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown codeline {name:?}; configured: {}",
                config
                    .codelines
                    .iter()
                    .map(|codeline| codeline.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        }),
        None => config
            .codelines
            .first()
            .ok_or_else(|| anyhow::anyhow!("no codelines configured")),
    }
}
