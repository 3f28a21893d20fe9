//! Resource identifiers.
//!
//! Every entity is keyed by a store-assigned integer. Each entity gets its own
//! newtype so a `JobId` can never be passed where an `AgentId` is expected.
//! IDs are unsigned, so negative values fail to decode.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Display, From,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        pub struct $name($inner);

        impl $name {
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Get the underlying integer.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

numeric_id!(
    /// Identifies a [`crate::Job`].
    JobId(u32)
);
numeric_id!(
    /// Identifies a [`crate::Project`].
    ProjectId(u32)
);
numeric_id!(
    /// Identifies a [`crate::Subproject`].
    SubprojectId(u32)
);
numeric_id!(
    /// Identifies a [`crate::Repo`].
    RepoId(u32)
);
numeric_id!(
    /// Identifies a [`crate::RepoPull`].
    RepoPullId(u32)
);
numeric_id!(
    /// Identifies a registered [`crate::Agent`].
    AgentId(u32)
);
numeric_id!(
    /// Identifies a [`crate::User`]. Unlike other IDs these are chosen by the
    /// caller rather than assigned by the store.
    UserId(u32)
);
numeric_id!(
    /// Identifies a [`crate::FileHash`].
    FileHashId(u64)
);
numeric_id!(
    /// Identifies a [`crate::FileInstance`].
    FileInstanceId(u64)
);
