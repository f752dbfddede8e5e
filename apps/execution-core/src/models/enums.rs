//! Status and side enums shared by the store and the engine.
//!
//! Every enum round-trips through its SCREAMING_CASE string form, which is
//! also the representation persisted in SQLite TEXT columns. Unknown strings
//! are integrity errors, never silently coerced.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a persisted enum string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Canonical string form (also the persisted representation).
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError::new(stringify!($name), other)),
                }
            }
        }
    };
}

string_enum! {
    /// Option contract right.
    OptionSide {
        Call => "CALL",
        Put => "PUT",
    }
}

string_enum! {
    /// Lifecycle of a tracked position.
    PositionStatus {
        Open => "OPEN",
        Closed => "CLOSED",
        Rolling => "ROLLING",
    }
}

string_enum! {
    /// Buy/sell direction of an order.
    OrderSide {
        Buy => "BUY",
        Sell => "SELL",
    }
}

string_enum! {
    /// Order pricing style.
    OrderType {
        Limit => "LIMIT",
        Market => "MARKET",
    }
}

string_enum! {
    /// Terminal-or-not state of an order intent (the idempotency record).
    IntentStatus {
        Pending => "PENDING",
        Executed => "EXECUTED",
        Skipped => "SKIPPED",
        Failed => "FAILED",
    }
}

string_enum! {
    /// Local mirror of a broker order's state.
    OrderStatus {
        Pending => "PENDING",
        Submitted => "SUBMITTED",
        Filled => "FILLED",
        Partial => "PARTIAL",
        Cancelled => "CANCELLED",
        Failed => "FAILED",
    }
}

impl OrderStatus {
    /// True when the order can still change at the broker.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Submitted | Self::Partial)
    }
}

impl OptionSide {
    /// Parse the single-letter OCC right code.
    #[must_use]
    pub const fn from_occ_code(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Call),
            'P' => Some(Self::Put),
            _ => None,
        }
    }
}
