//! Closed set of comparison predicates and their API/DB spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Predicate {
    Gt,
    Ge,
    Eq,
    Ne,
    Lt,
    Le,
    In,
    NotIn,
}

impl Predicate {
    pub const ALL: [Predicate; 8] = [
        Self::Gt,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Le,
        Self::In,
        Self::NotIn,
    ];

    /// Canonical (long) API form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
        }
    }

    /// Predicate as the database spells it.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
        }
    }

    /// `IN` and `NOT_IN` compare against a list value.
    #[must_use]
    pub const fn is_set(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// Literal that is not one of the known predicate spellings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown predicate: {0}")]
pub struct UnknownPredicate(pub String);

impl FromStr for Predicate {
    type Err = UnknownPredicate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "GT" => Ok(Self::Gt),
            ">=" | "GE" => Ok(Self::Ge),
            "=" | "EQ" => Ok(Self::Eq),
            "!=" | "NE" => Ok(Self::Ne),
            "<" | "LT" => Ok(Self::Lt),
            "<=" | "LE" => Ok(Self::Le),
            "IN" => Ok(Self::In),
            "NOT_IN" => Ok(Self::NotIn),
            other => Err(UnknownPredicate(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Predicate {
    type Error = UnknownPredicate;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Predicate> for &'static str {
    fn from(p: Predicate) -> Self {
        p.as_str()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
