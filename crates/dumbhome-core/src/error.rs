//! Error types shared across the dumbhome crates.

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No writable location for the prefs file could be determined
    /// (neither $XDG_CONFIG_HOME nor $HOME is set).
    #[error("cannot determine a preferences directory (set XDG_CONFIG_HOME or HOME)")]
    NoPrefsDir,

    /// A preference value passed over the CLI could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse preferences: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to serialize preferences: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
