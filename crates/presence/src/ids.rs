use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{InvalidIdSnafu, PresenceError, PresenceResult};

// Every presence key shares the same opaque-string shape, so the wrappers stay identical.
macro_rules! define_presence_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> PresenceResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-presence-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = PresenceError;

            fn from_str(raw: &str) -> PresenceResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_presence_id!(ThreadId, "thread-id");
define_presence_id!(UserId, "user-id");
