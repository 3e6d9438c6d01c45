//! Error types for the Harbor host.

use std::fmt;

/// A value supplied by the caller fell outside its admissible range.
///
/// The admissible range is always `0..limit` (upper bound exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeError {
    /// Name of the offending argument (e.g. `"channel"`).
    pub field: &'static str,
    /// Value that was rejected.
    pub value: i64,
    /// Exclusive upper bound.
    pub limit: i64,
}

impl RangeError {
    /// Create a new range error.
    pub const fn new(field: &'static str, value: i64, limit: i64) -> Self {
        Self { field, value, limit }
    }

    /// Check `value < limit`, returning a range error otherwise.
    pub fn check(field: &'static str, value: i64, limit: i64) -> Result<(), Self> {
        if (0..limit).contains(&value) {
            Ok(())
        } else {
            Err(Self::new(field, value, limit))
        }
    }
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} out of range (expected 0..{})",
            self.field, self.value, self.limit
        )
    }
}

impl std::error::Error for RangeError {}

/// Errors that can occur while hosting a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    /// The plugin bundle could not be opened or exposes no usable class.
    Load(String),
    /// The component or controller rejected initialization.
    Init(String),
    /// Processing setup was rejected or is missing.
    Setup(String),
    /// Activation or deactivation was rejected.
    Activation(String),
    /// The plugin reported a failure while processing a block.
    Process(String),
    /// A parameter id or value was rejected.
    Parameter(String),
    /// An event or buffer argument was out of range.
    Range(RangeError),
    /// A requested index or id does not exist.
    NotFound(String),
    /// Host configuration could not be parsed.
    Config(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(msg) => write!(f, "Load failed: {}", msg),
            Self::Init(msg) => write!(f, "Initialization failed: {}", msg),
            Self::Setup(msg) => write!(f, "Setup error: {}", msg),
            Self::Activation(msg) => write!(f, "Activation error: {}", msg),
            Self::Process(msg) => write!(f, "Processing error: {}", msg),
            Self::Parameter(msg) => write!(f, "Parameter error: {}", msg),
            Self::Range(err) => write!(f, "Range error: {}", err),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Range(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RangeError> for HostError {
    fn from(err: RangeError) -> Self {
        Self::Range(err)
    }
}

/// Result type for Harbor operations.
pub type HostResult<T> = Result<T, HostError>;
