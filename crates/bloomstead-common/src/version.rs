//! Version types for schema compatibility.

use serde::{Deserialize, Serialize};

/// Schema version using semantic versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version (breaking changes)
    pub major: u16,
    /// Minor version (backwards-compatible additions)
    pub minor: u16,
    /// Patch version (bug fixes)
    pub patch: u16,
}

impl SchemaVersion {
    /// Creates a new schema version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Current game save format version.
    pub const SAVE_FORMAT: Self = Self::new(1, 0, 0);

    /// Current static data file version.
    pub const DATA_FORMAT: Self = Self::new(1, 0, 0);

    /// Checks if this version is compatible with another version.
    /// Compatible means same major version and this minor >= other minor.
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major && self.minor >= other.minor
    }

    /// Checks if this version can read data from another version.
    #[must_use]
    pub const fn can_read(&self, data_version: &Self) -> bool {
        self.major == data_version.major
    }

    /// Packs the version into a single integer (`major.minor.patch` as
    /// `major * 1_000_000 + minor * 1_000 + patch`).
    #[must_use]
    pub const fn pack(self) -> u32 {
        self.major as u32 * 1_000_000 + self.minor as u32 * 1_000 + self.patch as u32
    }

    /// Reverses [`SchemaVersion::pack`].
    #[must_use]
    pub const fn unpack(packed: u32) -> Self {
        Self::new(
            (packed / 1_000_000) as u16,
            ((packed / 1_000) % 1_000) as u16,
            (packed % 1_000) as u16,
        )
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::SAVE_FORMAT
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
