use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// The closed set of tracked tickers.
///
/// Each symbol has a canonical code (`AAPL`) and a display name (`APPLE`);
/// parsing accepts either, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Symbol {
    Aapl,
    Ibm,
}

impl Symbol {
    /// Every symbol, in ingestion order.
    pub const ALL: [Symbol; 2] = [Symbol::Aapl, Symbol::Ibm];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Aapl => "AAPL",
            Self::Ibm => "IBM",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Aapl => "APPLE",
            Self::Ibm => "IBM",
        }
    }

    /// Resolve a code or display name to a symbol.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|symbol| symbol.code() == normalized || symbol.display_name() == normalized)
            .ok_or_else(|| ValidationError::UnknownSymbol {
                value: input.trim().to_string(),
            })
    }

    pub const fn as_str(self) -> &'static str {
        self.code()
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.code().to_string()
    }
}
