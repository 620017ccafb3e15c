//! Configuration loading from environment.
//!
//! Reads service settings from environment variables and loads the report
//! reason vocabulary from a file or environment.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TribunalError};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Main configuration for the Tribunal service.
#[derive(Debug, Clone)]
pub struct TribunalConfig {
    /// SQLite database file.
    pub database_path: String,
    /// Port for the HTTP API.
    pub web_port: u16,
    /// Page size used when a caller does not ask for one.
    pub default_page_size: u32,
    /// Upper bound on any requested page size.
    pub max_page_size: u32,
    /// Accepted report reasons.
    pub reasons: ReasonCatalog,
}

/// Vocabulary of report reason codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReasonCatalog {
    codes: Vec<String>,
}

impl ReasonCatalog {
    /// Build a catalog, normalising codes to lowercase and dropping blanks
    /// and duplicates.
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalised: Vec<String> = Vec::new();
        for code in codes {
            let code = code.as_ref().trim().to_lowercase();
            if !code.is_empty() && !normalised.contains(&code) {
                normalised.push(code);
            }
        }
        Self { codes: normalised }
    }

    /// Canonical code for `reason`, if it is in the catalog.
    pub fn resolve(&self, reason: &str) -> Option<&str> {
        let wanted = reason.trim().to_lowercase();
        self.codes
            .iter()
            .find(|code| **code == wanted)
            .map(String::as_str)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for ReasonCatalog {
    fn default() -> Self {
        default_reasons()
    }
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            database_path: "tribunal.db".to_string(),
            web_port: 8080,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            reasons: ReasonCatalog::default(),
        }
    }
}

impl TribunalConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `DATABASE_PATH`: SQLite file (default: tribunal.db)
    /// - `WEB_PORT`: HTTP port (default: 8080)
    /// - `DEFAULT_PAGE_SIZE`: page size when none is requested (default: 20)
    /// - `MAX_PAGE_SIZE`: largest page a caller may request (default: 100)
    /// - `REPORT_REASONS_PATH`: path to a JSON array of reason codes
    /// - `REPORT_REASONS`: comma-separated reason codes
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let database_path = env::var("DATABASE_PATH").unwrap_or(defaults.database_path);

        let web_port = match env::var("WEB_PORT") {
            Ok(s) => s
                .parse::<u16>()
                .map_err(|_| TribunalError::Config(format!("Invalid WEB_PORT: {}", s)))?,
            Err(_) => defaults.web_port,
        };

        let default_page_size = env::var("DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let max_page_size = env::var("MAX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PAGE_SIZE);

        if default_page_size == 0 || max_page_size < default_page_size {
            return Err(TribunalError::Config(format!(
                "Page sizes must satisfy 0 < DEFAULT_PAGE_SIZE ({}) <= MAX_PAGE_SIZE ({})",
                default_page_size, max_page_size
            )));
        }

        let reasons = load_reason_catalog()?;

        Ok(Self {
            database_path,
            web_port,
            default_page_size,
            max_page_size,
            reasons,
        })
    }
}

/// Load reason codes from file or environment.
fn load_reason_catalog() -> Result<ReasonCatalog> {
    if let Ok(path) = env::var("REPORT_REASONS_PATH") {
        return load_reasons_from_file(&path);
    }

    let codes = parse_list("REPORT_REASONS");
    if codes.is_empty() {
        return Ok(default_reasons());
    }

    Ok(ReasonCatalog::new(codes))
}

/// Load reason codes from a JSON file.
fn load_reasons_from_file(path: &str) -> Result<ReasonCatalog> {
    let path = Path::new(path);
    let content = fs::read_to_string(path)
        .map_err(|e| TribunalError::Config(format!("Failed to read reasons file: {}", e)))?;

    let codes: Vec<String> = serde_json::from_str(&content)
        .map_err(|e| TribunalError::Config(format!("Failed to parse reasons file: {}", e)))?;

    let catalog = ReasonCatalog::new(codes);
    if catalog.is_empty() {
        return Err(TribunalError::Config(
            "Reasons file contains no reason codes".to_string(),
        ));
    }

    Ok(catalog)
}

/// Parse a comma-separated list from an environment variable.
fn parse_list(var_name: &str) -> Vec<String> {
    env::var(var_name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn default_reasons() -> ReasonCatalog {
    ReasonCatalog::new([
        "spam",
        "harassment",
        "hate_speech",
        "illegal_content",
        "misinformation",
        "other",
    ])
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::io::Write;

    use crate::config::{load_reasons_from_file, parse_list, ReasonCatalog, TribunalConfig};

    #[test]
    fn default_catalog_has_spam() {
        let catalog = ReasonCatalog::default();
        assert_eq!(catalog.resolve("spam"), Some("spam"));
        assert_eq!(catalog.resolve(" SPAM "), Some("spam"));
        assert_eq!(catalog.resolve("cats"), None);
    }

    #[test]
    fn catalog_normalises_and_dedups() {
        let catalog = ReasonCatalog::new(["Spam", "spam", "  ", "Off_Topic"]);
        assert_eq!(catalog.codes(), &["spam".to_string(), "off_topic".to_string()]);
    }

    #[test]
    fn default_config_is_consistent() {
        let config = TribunalConfig::default();
        assert!(config.default_page_size <= config.max_page_size);
        assert!(!config.reasons.is_empty());
    }

    #[test]
    fn parse_list_empty() {
        let var_name = "TEST_TRIBUNAL_PARSE_EMPTY_12345";
        env::remove_var(var_name);
        assert!(parse_list(var_name).is_empty());
    }

    #[test]
    fn parse_list_multiple() {
        let var_name = "TEST_TRIBUNAL_PARSE_MULTI_12345";
        env::set_var(var_name, "spam, , harassment,other");
        let result = parse_list(var_name);
        assert_eq!(result, vec!["spam", "harassment", "other"]);
        env::remove_var(var_name);
    }

    #[test]
    fn reasons_file_loads() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"["spam", "Doxxing"]"#).expect("write");

        let catalog =
            load_reasons_from_file(file.path().to_str().expect("utf-8 path")).expect("load");
        assert_eq!(catalog.resolve("doxxing"), Some("doxxing"));
        assert_eq!(catalog.resolve("harassment"), None);
    }

    #[test]
    fn reasons_file_rejects_empty_list() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[]").expect("write");

        let result = load_reasons_from_file(file.path().to_str().expect("utf-8 path"));
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use crate::config::ReasonCatalog;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every code put into a catalog resolves, whatever its case.
        #[test]
        fn prop_catalog_resolves_members(codes in prop::collection::vec("[a-z_]{3,12}", 1..8)) {
            let catalog = ReasonCatalog::new(&codes);
            for code in &codes {
                prop_assert_eq!(catalog.resolve(&code.to_uppercase()), Some(code.as_str()));
            }
        }
    }
}
