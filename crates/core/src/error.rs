use thiserror::Error;

/// Errors raised while reading or writing pairing notation, or while
/// building a pairing graph from explicit pairs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("unmatched opening bracket '{symbol}' at position {position}")]
    UnmatchedOpen { position: usize, symbol: char },

    #[error("unmatched closing bracket '{symbol}' at position {position}")]
    UnmatchedClose { position: usize, symbol: char },

    #[error("invalid character '{symbol}' at position {position}")]
    InvalidCharacter { position: usize, symbol: char },

    #[error("base {position} is out of range for a structure of {len} bases")]
    OutOfRange { position: usize, len: usize },

    #[error("base {0} cannot pair with itself")]
    SelfPair(usize),

    #[error("base {position} is already paired with base {partner}")]
    AlreadyPaired { position: usize, partner: usize },

    #[error("structure needs {0} bracket families, more than the notation provides")]
    TooManyLevels(usize),
}

/// Errors raised while loading a base-pair geometry catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid base-pair type '{name}': {reason}")]
    InvalidEntry { name: String, reason: String },

    #[error("Duplicate base-pair type {id} for bases '{bases}'")]
    Duplicate { id: u32, bases: String },
}

/// Errors raised while loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level error for the convenience entry points in the crate root.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
