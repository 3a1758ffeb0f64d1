// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the `treeline.toml` configuration file that names
//! the codelines to manage, the build variants to produce, and where review
//! artifacts get exported and uploaded. File I/O is left to the caller to
//! figure out; see [`crate::path`] for where the file is expected to live.
//!
//! The built-in [`Default`] configuration reproduces a working setup for an
//! OpenJDK-style tree, so the tool is usable before a configuration file
//! exists.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Top-level configuration layout.
///
/// Composed of four parts: general tree settings, the codeline table, the
/// build variant table, and review publishing settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TreeConfig {
    /// General settings for the managed tree.
    #[serde(default)]
    pub tree: TreeSettings,

    /// Codelines (checkouts) this tool manages.
    #[serde(rename = "codeline", default = "CodelineDefinition::builtin")]
    pub codelines: Vec<CodelineDefinition>,

    /// Build variants producible in every codeline.
    #[serde(rename = "variant", default = "BuildVariant::builtin")]
    pub variants: Vec<BuildVariant>,

    /// Review export and upload settings.
    #[serde(default)]
    pub review: ReviewSettings,
}

impl TreeConfig {
    /// Look up a codeline definition by name.
    pub fn codeline(&self, name: impl AsRef<str>) -> Option<&CodelineDefinition> {
        self.codelines
            .iter()
            .find(|codeline| codeline.name == name.as_ref())
    }

    /// Look up a build variant by name.
    pub fn variant(&self, name: impl AsRef<str>) -> Option<&BuildVariant> {
        self.variants
            .iter()
            .find(|variant| variant.name == name.as_ref())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            tree: TreeSettings::default(),
            codelines: CodelineDefinition::builtin(),
            variants: BuildVariant::builtin(),
            review: ReviewSettings::default(),
        }
    }
}

impl FromStr for TreeConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: TreeConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path-like fields.
        config.tree.root = expand_path(&config.tree.root)?;
        config.review.export_dir = expand_path(&config.review.export_dir)?;
        config.review.webrev_script = expand_path(&config.review.webrev_script)?;
        if let Some(gtest_dir) = &config.tree.gtest_dir {
            config.tree.gtest_dir = Some(expand_path(gtest_dir)?);
        }

        Ok(config)
    }
}

impl Display for TreeConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// General settings for the managed tree.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TreeSettings {
    /// Root directory under which all codeline directories live.
    #[serde(default = "TreeSettings::default_root")]
    pub root: PathBuf,

    /// Name of the boot JDK under `<root>/jdks` used to bootstrap builds.
    #[serde(default = "TreeSettings::default_boot_jdk")]
    pub boot_jdk: String,

    /// Anchor directory used to derive include guard names.
    #[serde(default = "TreeSettings::default_guard_anchor")]
    pub guard_anchor: String,

    /// Googletest checkout handed to configure, if any.
    pub gtest_dir: Option<PathBuf>,
}

impl TreeSettings {
    fn default_root() -> PathBuf {
        PathBuf::from("/shared/projects/openjdk")
    }

    fn default_boot_jdk() -> String {
        "sapmachine15".to_owned()
    }

    fn default_guard_anchor() -> String {
        crate::normalize::DEFAULT_GUARD_ANCHOR.to_owned()
    }
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            boot_jdk: Self::default_boot_jdk(),
            guard_anchor: Self::default_guard_anchor(),
            gtest_dir: None,
        }
    }
}

/// Version control flavor of a codeline.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VcsKind {
    /// Plain Git repository.
    #[default]
    Git,

    /// Unified Mercurial repository.
    Mercurial,

    /// Mercurial forest; `get_source.sh` pulls the sub-repositories.
    MercurialForest,
}

/// One codeline (checkout) definition.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CodelineDefinition {
    /// Local name; also the directory name under the tree root.
    pub name: String,

    /// Version control flavor.
    #[serde(default)]
    pub vcs: VcsKind,

    /// Remote URL to obtain the sources from.
    pub url: String,

    /// Branch to check out after cloning (Git only).
    pub branch: Option<String>,
}

impl CodelineDefinition {
    /// Built-in codeline table.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                name: "jdk-jdk".into(),
                vcs: VcsKind::Git,
                url: "https://github.com/openjdk/jdk.git".into(),
                branch: Some("master".into()),
            },
            Self {
                name: "jdk-jdk11u-dev".into(),
                vcs: VcsKind::Mercurial,
                url: "http://hg.openjdk.java.net/jdk-updates/jdk11u-dev/".into(),
                branch: None,
            },
            Self {
                name: "jdk-jdk8u-dev".into(),
                vcs: VcsKind::MercurialForest,
                url: "http://hg.openjdk.java.net/jdk8u/jdk8u-dev/".into(),
                branch: None,
            },
        ]
    }
}

/// One build variant definition.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct BuildVariant {
    /// Variant name; also names the `output-<name>` directory.
    pub name: String,

    /// Options handed to the configure script.
    pub configure_options: Vec<String>,
}

impl BuildVariant {
    /// Built-in build variant table.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                name: "release".into(),
                configure_options: vec!["--with-debug-level=release".into()],
            },
            Self {
                name: "slowdebug".into(),
                configure_options: vec!["--with-debug-level=slowdebug".into()],
            },
            Self {
                name: "fastdebug".into(),
                configure_options: vec!["--with-debug-level=fastdebug".into()],
            },
            Self {
                name: "fastdebug-nopch".into(),
                configure_options: vec![
                    "--with-debug-level=fastdebug".into(),
                    "--disable-precompiled-headers".into(),
                ],
            },
            Self {
                name: "fastdebug-zero".into(),
                configure_options: vec![
                    "--with-debug-level=fastdebug".into(),
                    "--with-jvm-variants=zero".into(),
                ],
            },
        ]
    }
}

/// Review export and upload settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ReviewSettings {
    /// Directory patches and webrevs are exported into.
    #[serde(default = "ReviewSettings::default_export_dir")]
    pub export_dir: PathBuf,

    /// Location of the webrev generator script.
    #[serde(default = "ReviewSettings::default_webrev_script")]
    pub webrev_script: PathBuf,

    /// Rsync destination (`user@host:path`) for uploads. Empty means
    /// uploading is not configured.
    #[serde(default)]
    pub upload_to: String,
}

impl ReviewSettings {
    fn default_export_dir() -> PathBuf {
        PathBuf::from("/shared/projects/openjdk/export")
    }

    fn default_webrev_script() -> PathBuf {
        PathBuf::from("/shared/projects/code-tools/webrev/webrev.ksh")
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            export_dir: Self::default_export_dir(),
            webrev_script: Self::default_webrev_script(),
            upload_to: String::new(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("DEV", "/home/dev")])]
    fn deserialize_tree_config() -> anyhow::Result<()> {
        let result: TreeConfig = r#"
            [tree]
            root = "$DEV/openjdk"
            boot_jdk = "openjdk21"

            [[codeline]]
            name = "jdk-jdk"
            vcs = "git"
            url = "https://github.com/openjdk/jdk.git"
            branch = "master"

            [[variant]]
            name = "fastdebug"
            configure_options = ["--with-debug-level=fastdebug"]

            [review]
            export_dir = "$DEV/export"
            webrev_script = "$DEV/code-tools/webrev/webrev.ksh"
            upload_to = "dev@cr.example.org:/home/dev/webrevs"
        "#
        .parse()?;

        let expect = TreeConfig {
            tree: TreeSettings {
                root: "/home/dev/openjdk".into(),
                boot_jdk: "openjdk21".into(),
                guard_anchor: "src/hotspot".into(),
                gtest_dir: None,
            },
            codelines: vec![CodelineDefinition {
                name: "jdk-jdk".into(),
                vcs: VcsKind::Git,
                url: "https://github.com/openjdk/jdk.git".into(),
                branch: Some("master".into()),
            }],
            variants: vec![BuildVariant {
                name: "fastdebug".into(),
                configure_options: vec!["--with-debug-level=fastdebug".into()],
            }],
            review: ReviewSettings {
                export_dir: "/home/dev/export".into(),
                webrev_script: "/home/dev/code-tools/webrev/webrev.ksh".into(),
                upload_to: "dev@cr.example.org:/home/dev/webrevs".into(),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn empty_config_falls_back_to_builtin_tables() {
        let result: TreeConfig = "".parse().unwrap();

        assert_eq!(result.tree, TreeSettings::default());
        assert_eq!(result.codelines, CodelineDefinition::builtin());
        assert_eq!(result.variants, BuildVariant::builtin());
        assert!(result.codeline("jdk-jdk").is_some());
        assert!(result.variant("fastdebug-zero").is_some());
        assert!(result.variant("nonesuch").is_none());
    }

    #[test]
    fn config_round_trips_through_display() {
        let config = TreeConfig::default();

        let reparsed: TreeConfig = config.to_string().parse().unwrap();
        assert_eq!(reparsed, config);
    }
}
