use crate::policy::SearchContext;
use crate::search::{Locale, SearchConfig};
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "CONCEPT_SEARCH_CONFIG";

/// Prefix of environment overrides, e.g. `CONCEPT_SEARCH__SEARCH__DEFAULT_LIMIT`
pub const ENV_PREFIX: &str = "CONCEPT_SEARCH";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search engine configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Locale defaults
    #[serde(default)]
    pub locale: LocaleConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and
    /// the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/concept-search".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Request context built from the locale defaults
    pub fn search_context(&self) -> SearchContext {
        SearchContext::from(&self.locale)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    /// Locale used when a request names none
    #[serde(default = "default_locale")]
    pub default_locale: Locale,

    /// Whether literal name comparisons respect case
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_locale() -> Locale {
    Locale::new("en")
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            case_sensitive: false,
        }
    }
}

impl From<&LocaleConfig> for SearchContext {
    fn from(config: &LocaleConfig) -> Self {
        SearchContext::new(config.default_locale.clone()).with_case_sensitive(config.case_sensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_defaults() {
        let config = Config::load().unwrap();
        assert_eq!(config.search.default_limit, 100);
        assert_eq!(config.search.max_concept_id_clauses, 512);
        assert!(config.search.index_path.is_none());
        assert_eq!(config.locale.default_locale, Locale::new("en"));
    }

    #[test]
    fn test_file_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("override.toml");
        std::fs::write(&path, "[search]\ndefault_limit = 25\n\n[locale]\ndefault_locale = \"fr_CA\"\n").unwrap();

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.search.default_limit, 25);
        assert_eq!(config.search.max_results, 10_000);
        assert_eq!(config.search_context().locale, Locale::with_country("fr", "CA"));
    }

    #[test]
    fn test_malformed_locale_rejected() {
        let result: Result<Config, _> = config::Config::builder()
            .add_source(config::File::from_str(
                "[locale]\ndefault_locale = \"e1\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize();
        assert!(result.is_err());
    }
}
