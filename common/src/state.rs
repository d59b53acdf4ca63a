#[cfg(feature = "diesel")]
use diesel::{
    deserialize::FromSql, serialize::Output, serialize::ToSql, sql_types::Text, sqlite::Sqlite,
    sqlite::SqliteValue, AsExpression, FromSqlRow,
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Formatter;

#[derive(Debug, Clone)]
pub struct StateParseError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for StateParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let value = &self.value;
        write!(f, "could not parse \"{value}\" as a {}", self.kind)
    }
}

impl Error for StateParseError {}

/// Generates the text representation and the sqlite mapping for a state enum.
macro_rules! text_enum {
    ($name:ident, $kind:expr, { $($variant:ident => $text:expr),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<&str> for $name {
            type Error = StateParseError;

            fn try_from(value: &str) -> Result<Self, StateParseError> {
                match value {
                    $($text => Ok($name::$variant),)+
                    _ => Err(StateParseError {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = StateParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from(s)
            }
        }

        #[cfg(feature = "diesel")]
        impl FromSql<Text, Sqlite> for $name {
            fn from_sql(bytes: SqliteValue) -> diesel::deserialize::Result<Self> {
                let t = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(t.as_str().try_into()?)
            }
        }

        #[cfg(feature = "diesel")]
        impl ToSql<Text, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> diesel::serialize::Result {
                out.set_value(self.as_str());
                Ok(diesel::serialize::IsNull::No)
            }
        }
    };
}

/// Lifecycle of a single build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Queued,
    Building,
    Built,
}

text_enum!(BuildState, "build state", {
    Queued => "queued",
    Building => "building",
    Built => "built",
});

/// Out-of-band rebuild request attached to a build.
///
/// `Forcing` is set while the build is in progress and turns into `Forced`
/// once the current attempt finishes. `Forced` on a built build makes the
/// scheduler queue it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
#[serde(rename_all = "snake_case")]
pub enum ForceState {
    Unforced,
    Forcing,
    Forced,
}

text_enum!(ForceState, "force state", {
    Unforced => "unforced",
    Forcing => "forcing",
    Forced => "forced",
});

/// Outcome of a build or of one of its operations, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(FromSqlRow, AsExpression))]
#[cfg_attr(feature = "diesel", diesel(sql_type = Text))]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Warning,
    Error,
    Abort,
    Abnormal,
    Skip,
    Interrupt,
}

text_enum!(ResultStatus, "result status", {
    Success => "success",
    Warning => "warning",
    Error => "error",
    Abort => "abort",
    Abnormal => "abnormal",
    Skip => "skip",
    Interrupt => "interrupt",
});

impl ResultStatus {
    /// Combine the operation results into the overall build result.
    pub fn worst<I: IntoIterator<Item = ResultStatus>>(statuses: I) -> Option<ResultStatus> {
        statuses.into_iter().max()
    }
}
