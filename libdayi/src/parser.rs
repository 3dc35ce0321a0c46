//! Code buffer parsing.
//!
//! A raw buffer is a whitespace-separated list of Dàyì codes. Each code is a
//! run of keys from the Dàyì layout: letters, digits and the punctuation keys
//! `` , . / ; ' ` = [ ] - \ ``. Letters are case-insensitive.
use libdayi_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DEFAULT_MAX_BUFFER_CODES;

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9,./;'`=\[\]\-\\]+$").expect("code key pattern compiles"));

/// Whether `code` consists only of Dàyì keys (after lowercasing).
pub fn is_valid_code(code: &str) -> bool {
    CODE_PATTERN.is_match(&code.to_lowercase())
}

/// Splits and validates raw code buffers.
#[derive(Debug, Clone)]
pub struct CodeParser {
    max_codes: usize,
}

impl Default for CodeParser {
    fn default() -> Self {
        Self {
            max_codes: DEFAULT_MAX_BUFFER_CODES,
        }
    }
}

impl CodeParser {
    pub fn new(max_codes: usize) -> Self {
        Self {
            max_codes: max_codes.max(1),
        }
    }

    pub fn max_codes(&self) -> usize {
        self.max_codes
    }

    /// Parse a buffer into lowercase codes.
    pub fn parse(&self, raw: &str) -> Result<Vec<String>> {
        let mut codes = Vec::new();
        for token in raw.split_whitespace() {
            let code = token.to_lowercase();
            if !CODE_PATTERN.is_match(&code) {
                return Err(Error::input(format!("`{}` is not a Dàyì code", token)));
            }
            codes.push(code);
        }
        if codes.is_empty() {
            return Err(Error::input("empty code sequence"));
        }
        if codes.len() > self.max_codes {
            return Err(Error::input(format!(
                "{} codes exceed the buffer limit of {}",
                codes.len(),
                self.max_codes
            )));
        }
        Ok(codes)
    }
}
