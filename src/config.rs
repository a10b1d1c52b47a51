//! Site configuration loaded from `site.yml`.
//!
//! Every field has a default, so an empty or missing file is a valid config.
//! Relative directories are resolved against the directory holding the file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::controllers::HighlightVariant;
use crate::error::{Result, SiteError};
use crate::highlight::DEFAULT_THEME;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "site.yml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Shown in the site header and page titles.
    pub title: String,
    /// Markdown articles are read from here.
    pub content_dir: PathBuf,
    /// Built pages are written here.
    pub output_dir: PathBuf,
    /// Copied verbatim into the output directory when it exists.
    pub static_dir: PathBuf,
    /// Grammar configuration for the code highlighter.
    pub highlight: HighlightVariant,
    /// One of syntect's bundled themes.
    pub theme: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Blog".to_owned(),
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("public"),
            static_dir: PathBuf::from("static"),
            highlight: HighlightVariant::default(),
            theme: DEFAULT_THEME.to_owned(),
        }
    }
}

impl SiteConfig {
    /// Parse YAML config text. Relative paths are left as written.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(text).map_err(|e| SiteError::Config(e.to_string()))
    }

    /// Load config from `path`, or from [`DEFAULT_CONFIG_FILE`] in the working
    /// directory when `path` is `None`. A missing default file yields the
    /// defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                debug!(path = %file.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(SiteError::io(&file, e)),
        };

        let mut config = Self::from_yaml(&text)?;
        let base = file.parent().unwrap_or(Path::new(""));
        config.resolve_relative_to(base);
        info!(path = %file.display(), title = %config.title, "config loaded");
        Ok(config)
    }

    /// Rebase relative directories onto `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        for dir in [
            &mut self.content_dir,
            &mut self.output_dir,
            &mut self.static_dir,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}
