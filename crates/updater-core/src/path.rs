use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// A path that stays inside whatever root it is resolved against.
///
/// Stored normalized: `/`-separated, no `.` segments, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    /// Validate `raw` as a confined relative path.
    ///
    /// Both `/` and `\` are accepted as separators.
    ///
    /// # Errors
    /// Returns an error for empty paths, absolute or drive-prefixed paths, and
    /// any path containing a `..` segment.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::NulCharacter);
        }
        if raw.starts_with(['/', '\\']) || has_drive_prefix(raw) || Path::new(raw).is_absolute() {
            return Err(PathError::Absolute);
        }

        let mut segments = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => return Err(PathError::ParentEscape),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join onto `root`, one component per segment.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn has_drive_prefix(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
