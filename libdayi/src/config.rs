//! Dàyì-specific configuration that extends the base `Config` from core.
//!
//! This configuration includes:
//! - All scoring, learning and cache options from `libdayi_core::Config`
//!   (flattened via serde, so they sit at the top level of the TOML file)
//! - Where the runtime artifacts live and what they are called
//! - The code buffer limit of a sentence session
//!
//! # Example
//!
//! ```rust
//! use libdayi::DayiConfig;
//!
//! let config = DayiConfig::from_toml_str("top_k = 3\ndata_dir = \"/tmp/dayi\"\n").unwrap();
//! assert_eq!(config.base().top_k, 3);
//! assert_eq!(config.dictionary_path(), std::path::Path::new("/tmp/dayi/dayi_db.json"));
//! ```
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_DICTIONARY_FILE: &str = "dayi_db.json";
pub const DEFAULT_NGRAM_FILE: &str = "ngram_db.json";
pub const DEFAULT_USER_STORE_FILE: &str = "user_adaptation.redb";
/// Longest code sequence a session accepts.
pub const DEFAULT_MAX_BUFFER_CODES: usize = 10;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DayiConfig {
    #[serde(flatten)]
    pub base: libdayi_core::Config,

    /// Directory holding the dictionary, the n-gram model and the user store.
    pub data_dir: Option<PathBuf>,
    pub dictionary_file: String,
    pub ngram_file: String,
    /// Persistent adaptation store. An absolute path is used as is.
    pub user_store_file: String,

    pub max_buffer_codes: usize,
}

impl Default for DayiConfig {
    fn default() -> Self {
        Self {
            base: libdayi_core::Config::default(),
            data_dir: None,
            dictionary_file: DEFAULT_DICTIONARY_FILE.to_string(),
            ngram_file: DEFAULT_NGRAM_FILE.to_string(),
            user_store_file: DEFAULT_USER_STORE_FILE.to_string(),
            max_buffer_codes: DEFAULT_MAX_BUFFER_CODES,
        }
    }
}

impl DayiConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Convert into the base config for use with the core engine.
    pub fn into_base(self) -> libdayi_core::Config {
        self.base
    }

    pub fn base(&self) -> &libdayi_core::Config {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut libdayi_core::Config {
        &mut self.base
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.data_dir().join(&self.dictionary_file)
    }

    pub fn ngram_path(&self) -> PathBuf {
        self.data_dir().join(&self.ngram_file)
    }

    pub fn user_store_path(&self) -> PathBuf {
        // join keeps an absolute file name unchanged
        self.data_dir().join(&self.user_store_file)
    }
}
