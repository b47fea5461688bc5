//! Load and analysis options.
//!
//! A [`Config`] is handed to [`crate::dex::DexFile::load_with_config`] and
//! [`crate::analysis::Analysis::with_config`]. Nothing here is process-wide.

use serde::{Deserialize, Serialize};

/// Packages treated as part of the Android framework when guessing whether an
/// external class or method is an API entry point.
pub const DEFAULT_API_PACKAGES: [&str; 11] = [
    "Landroid/",
    "Lcom/android/internal/util",
    "Ldalvik/",
    "Ljava/",
    "Ljavax/",
    "Lorg/apache/",
    "Lorg/json/",
    "Lorg/w3c/dom/",
    "Lorg/xml/sax",
    "Lorg/xmlpull/v1/",
    "Ljunit/",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API level used for permission lookups when the caller gives none.
    pub default_api: u32,
    /// Reject files whose Adler-32 checksum does not match.
    pub verify_checksum: bool,
    /// Reject files whose SHA-1 signature does not match. When false a
    /// mismatch is only logged.
    pub verify_signature: bool,
    /// Escape every non-ASCII character of resolved strings as `\uXXXX`.
    pub recode_ascii_strings: bool,
    /// Type prefixes used by `is_android_api`.
    pub api_packages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_api: 16,
            verify_checksum: true,
            verify_signature: false,
            recode_ascii_strings: false,
            api_packages: DEFAULT_API_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn with_default_api(mut self, api: u32) -> Self {
        self.default_api = api;
        self
    }

    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn with_verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }

    pub fn with_recode_ascii_strings(mut self, recode: bool) -> Self {
        self.recode_ascii_strings = recode;
        self
    }

    pub fn with_api_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// True when `class_name` starts with one of the configured API prefixes.
    pub fn is_api_package(&self, class_name: &str) -> bool {
        self.api_packages.iter().any(|p| class_name.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.default_api, 16);
        assert!(c.verify_checksum);
        assert!(!c.verify_signature);
        assert!(c.is_api_package("Landroid/telephony/SmsManager;"));
        assert!(c.is_api_package("Lorg/xml/sax/Parser;"));
        assert!(!c.is_api_package("Lcom/example/Main;"));
    }

    #[test]
    fn builder_overrides() {
        let c = Config::default()
            .with_default_api(28)
            .with_verify_checksum(false)
            .with_api_packages(["Lcom/vendor/"]);
        assert_eq!(c.default_api, 28);
        assert!(!c.verify_checksum);
        assert!(c.is_api_package("Lcom/vendor/Api;"));
        assert!(!c.is_api_package("Landroid/app/Activity;"));
    }
}
