use crate::error::BinbakError;
use crate::Result;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::path::PathBuf;

/// Timestamp embedded in artifact names, second resolution
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d_%H.%M.%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Full,
    Incremental,
}

impl ArtifactKind {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Full => "full",
            ArtifactKind::Incremental => "incremental",
        }
    }
}

/// A backup file in the destination store
#[derive(Debug, Clone, PartialEq)]
pub struct BackupArtifact {
    pub kind: ArtifactKind,
    pub created_at: DateTime<Local>,
    pub log_segment: String,
    pub path: PathBuf,
}

/// Builds artifact file names from the configured prefixes
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    pub full_prefix: String,
    pub incremental_prefix: String,
    pub extension: String,
    pub max_filename_length: usize,
}

impl ArtifactNamer {
    pub fn prefix(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Full => &self.full_prefix,
            ArtifactKind::Incremental => &self.incremental_prefix,
        }
    }

    /// `{prefix}-{timestamp}[{segment}].{ext}`
    ///
    /// The segment must be the one current *before* any log rotation. Two
    /// calls in the same second with the same segment return the same name,
    /// so writers must create the file exclusively.
    pub fn name(
        &self,
        kind: ArtifactKind,
        timestamp: &DateTime<Local>,
        log_segment: &str,
    ) -> Result<String> {
        if log_segment.is_empty() {
            return Err(BinbakError::validation("Empty log segment identifier"));
        }

        let prefix = self.prefix(kind);
        let timestamp_str = timestamp.format(TIMESTAMP_FORMAT);
        let name = if self.extension.is_empty() {
            format!("{prefix}-{timestamp_str}[{log_segment}]")
        } else {
            format!(
                "{prefix}-{timestamp_str}[{log_segment}].{}",
                self.extension
            )
        };

        validate_filename_length(&name, self.max_filename_length)?;
        validate_filesystem_chars(&name)?;

        Ok(name)
    }

    /// Recover an artifact description from a file name, if it is one of ours
    pub fn parse(&self, file_name: &str) -> Option<(ArtifactKind, DateTime<Local>, String)> {
        // Check the longer prefix first in case one prefix extends the other
        let mut kinds = [ArtifactKind::Full, ArtifactKind::Incremental];
        kinds.sort_by_key(|kind| std::cmp::Reverse(self.prefix(*kind).len()));

        for kind in kinds {
            let Some(rest) = file_name
                .strip_prefix(self.prefix(kind))
                .and_then(|rest| rest.strip_prefix('-'))
            else {
                continue;
            };

            let open = rest.find('[')?;
            let close = rest.rfind(']')?;
            if close <= open + 1 {
                return None;
            }

            let naive = NaiveDateTime::parse_from_str(&rest[..open], TIMESTAMP_FORMAT).ok()?;
            let created_at = Local.from_local_datetime(&naive).earliest()?;
            let segment = rest[open + 1..close].to_string();
            return Some((kind, created_at, segment));
        }

        None
    }
}

/// Validate that the filename doesn't exceed the maximum length
fn validate_filename_length(filename: &str, max_length: usize) -> Result<()> {
    if filename.len() > max_length {
        return Err(BinbakError::validation(format!(
            "Backup filename too long: {} chars (max: {max_length})",
            filename.len()
        )));
    }
    Ok(())
}

/// Validate that the filename doesn't contain problematic characters
fn validate_filesystem_chars(filename: &str) -> Result<()> {
    // Characters that are problematic on Windows and FAT-formatted media
    const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

    let invalid_chars: String = filename
        .chars()
        .filter(|c| INVALID_CHARS.contains(c))
        .collect();
    if !invalid_chars.is_empty() {
        return Err(BinbakError::validation(format!(
            "Invalid filesystem characters in backup name: {invalid_chars}"
        )));
    }

    if filename.chars().any(|c| c.is_control()) {
        return Err(BinbakError::validation(
            "Control characters in backup name",
        ));
    }

    Ok(())
}
