//! Closed string-tagged enums
//!
//! Categories, split methods and activity kinds travel as snake_case strings.
//! A value this build does not know is kept as `Unknown(raw)` and written
//! back unchanged, so records created by newer clients survive a round trip.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! tagged_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $tag:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// A tag this build does not recognise
            Unknown(String),
        }

        impl $name {
            /// Every known variant, in declaration order
            pub const KNOWN: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $tag,)+
                    $name::Unknown(raw) => raw,
                }
            }

            pub fn is_unknown(&self) -> bool {
                matches!(self, $name::Unknown(_))
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                match raw {
                    $($tag => $name::$variant,)+
                    other => $name::Unknown(other.to_string()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok($name::from(raw.as_str()))
            }
        }
    };
}

tagged_enum!(
    /// How an expense total is divided between participants
    SplitMethod {
        Equal => "equal",
        Exact => "exact",
        Percentage => "percentage",
        Shares => "shares",
    }
);

tagged_enum!(
    /// Spending category shown alongside an expense
    ExpenseCategory {
        General => "general",
        Food => "food",
        Groceries => "groceries",
        Transport => "transport",
        Accommodation => "accommodation",
        Entertainment => "entertainment",
        Utilities => "utilities",
        Rent => "rent",
        Shopping => "shopping",
        Travel => "travel",
        Health => "health",
        Other => "other",
    }
);

tagged_enum!(
    /// What an activity log entry records
    ActivityKind {
        ExpenseCreated => "expense_created",
        ExpenseUpdated => "expense_updated",
        ExpenseDeleted => "expense_deleted",
        SettlementCreated => "settlement_created",
        RecurringGenerated => "recurring_generated",
        GroupCreated => "group_created",
        GroupDeleted => "group_deleted",
    }
);

impl Default for SplitMethod {
    fn default() -> Self {
        SplitMethod::Equal
    }
}

impl Default for ExpenseCategory {
    fn default() -> Self {
        ExpenseCategory::General
    }
}
