//! Error taxonomy shared by every decode, load and learning path.

use std::io;

/// Errors surfaced by the core crate.
///
/// `Input`, `Lookup` and `Model` abort a decode (or a model load) and are
/// meant to reach the caller untouched: "no prediction possible" must stay
/// distinguishable from "predicted, possibly imperfect". The remaining
/// variants wrap the serialization and storage layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request itself is unusable (empty code list, malformed buffer).
    #[error("input error: {0}")]
    Input(String),

    /// A code resolved to zero candidates.
    #[error("no candidates for code `{code}`")]
    Lookup { code: String },

    /// Smoothing parameters or serialized counts are unusable.
    #[error("invalid language model: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("fst error: {0}")]
    Fst(#[from] fst::Error),

    #[error("adaptation store error: {0}")]
    Store(#[from] redb::Error),
}

impl Error {
    pub fn input(msg: impl Into<String>) -> Self {
        Error::Input(msg.into())
    }

    pub fn lookup(code: impl Into<String>) -> Self {
        Error::Lookup { code: code.into() }
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
