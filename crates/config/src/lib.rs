//! Layered configuration.
//!
//! Values are resolved from, lowest precedence first:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. a configuration file (TOML, YAML or JSON, picked by extension),
//! 3. environment variables prefixed `ZIMR_`, with `__` separating nested
//!    keys (`ZIMR_SEARCH__TIMEOUT_MS=5000`).
//!
//! ```toml
//! archive_directory = "/srv/zim"
//!
//! [archives]
//! cache_capacity = 10
//! max_file_size = 107374182400
//!
//! [search]
//! cache_capacity = 100
//! timeout_ms = 30000
//! max_concurrent = 4
//! parallel = true
//! max_results = 100
//!
//! [content]
//! max_chars = 100000
//! default_mode = "markdown"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};
pub use zimr_content::OutputMode;

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "ZIMR_";
const APPLICATION: &str = "zimr";
const DEFAULT_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory searched (recursively) for `.zim` files.
    pub archive_directory: PathBuf,
    pub archives: ArchiveSettings,
    pub search: SearchSettings,
    pub content: ContentSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Maximum number of archives kept open at once.
    pub cache_capacity: usize,
    /// Archives larger than this many bytes are never opened.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Maximum number of merged result pages remembered.
    pub cache_capacity: usize,
    /// Per-archive search deadline, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of archives searched at the same time.
    pub max_concurrent: usize,
    /// When `false`, archives are searched one after another.
    pub parallel: bool,
    /// Upper bound on the page size a caller may ask for.
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Character ceiling for processed text.
    pub max_chars: usize,
    /// Output used when a caller doesn't ask for one.
    pub default_mode: OutputMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_directory: PathBuf::from("./zim"),
            archives: ArchiveSettings::default(),
            search: SearchSettings::default(),
            content: ContentSettings::default(),
        }
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 10,
            max_file_size: 100 * 1024 * 1024 * 1024,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            timeout_ms: 30_000,
            max_concurrent: 4,
            parallel: true,
            max_results: 100,
        }
    }
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            max_chars: 100_000,
            default_mode: OutputMode::Markdown,
        }
    }
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// How many archives may be searched at once: `max_concurrent`, or one
    /// when parallel search is turned off.
    pub fn concurrency(&self) -> usize {
        match self.parallel {
            true => self.max_concurrent,
            false => 1,
        }
    }
}

impl Config {
    /// `config.toml` in the platform's configuration directory, if the
    /// platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    /// Load configuration from every layer and validate it.
    ///
    /// With an explicit `file`, that file must exist. Without one, the
    /// [default path](Self::default_path) is used if a file exists there.
    #[instrument(skip_all, fields(file = ?file))]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let mut figment = Self::defaults();
        if let Some(path) = &file {
            debug!(path = %path.display(), "reading configuration file");
            figment = figment.merge(file_provider(path)?);
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Built-in defaults as a figment, for callers that want to add their
    /// own layers before calling [`Config::extract`].
    pub fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    /// Extract and validate a configuration from an assembled figment.
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|err| exn::Exn::from(ErrorKind::Parse(err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the library unusable.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, bool); 6] = [
            ("archives.cache_capacity", self.archives.cache_capacity == 0),
            ("search.cache_capacity", self.search.cache_capacity == 0),
            ("search.timeout_ms", self.search.timeout_ms == 0),
            ("search.max_concurrent", self.search.max_concurrent == 0),
            ("search.max_results", self.search.max_results == 0),
            ("content.max_chars", self.content.max_chars == 0),
        ];
        if let Some((key, _)) = checks.into_iter().find(|(_, zero)| *zero) {
            exn::bail!(ErrorKind::Invalid {
                key,
                reason: "must be greater than zero"
            });
        }
        Ok(())
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let provider = match extension.as_deref() {
        Some("toml") => Figment::from(Toml::file_exact(path)),
        Some("yaml" | "yml") => Figment::from(Yaml::file_exact(path)),
        Some("json") => Figment::from(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.timeout(), Duration::from_secs(30));
        assert_eq!(config.search.concurrency(), 4);
        assert_eq!(config.content.default_mode, OutputMode::Markdown);
    }

    #[test]
    fn test_sequential_search_has_concurrency_one() {
        let mut settings = SearchSettings::default();
        settings.parallel = false;
        assert_eq!(settings.concurrency(), 1);
    }

    #[rstest]
    #[case("archives.cache_capacity", |c: &mut Config| c.archives.cache_capacity = 0)]
    #[case("search.cache_capacity", |c: &mut Config| c.search.cache_capacity = 0)]
    #[case("search.timeout_ms", |c: &mut Config| c.search.timeout_ms = 0)]
    #[case("search.max_concurrent", |c: &mut Config| c.search.max_concurrent = 0)]
    #[case("search.max_results", |c: &mut Config| c.search.max_results = 0)]
    #[case("content.max_chars", |c: &mut Config| c.content.max_chars = 0)]
    fn test_validate_rejects_zero(#[case] expected: &str, #[case] update: fn(&mut Config)) {
        let mut config = Config::default();
        update(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { key, .. } if *key == expected));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = file_provider(Path::new("zimr.ini")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }
}
