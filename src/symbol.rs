use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque trading-pair key, e.g. `"BTC-USDT"`.
///
/// Unlike the teacher's closed `Pair` enum, the matching core treats the
/// symbol as a free-form string (the source accepts arbitrary symbols);
/// the HTTP layer is free to validate against a supported-symbol list
/// without the core itself knowing about a fixed pair table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Symbol {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}
