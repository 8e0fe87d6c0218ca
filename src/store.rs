use crate::error::BinbakError;
use crate::naming::{ArtifactNamer, BackupArtifact};
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// The backup media. There is no manifest: everything is derived from the
/// directory listing on each call.
#[derive(Debug, Clone)]
pub struct DestinationStore {
    root: PathBuf,
}

impl DestinationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names of every entry in the destination
    pub fn entry_names(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| self.unavailable(e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.unavailable(e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Whether any entry carries the full-backup marker
    pub fn has_full_backup(&self, full_marker: &str) -> Result<bool> {
        Ok(contains_marker(self.entry_names()?, full_marker))
    }

    /// Recognised artifacts, oldest first
    pub fn list_artifacts(&self, namer: &ArtifactNamer) -> Result<Vec<BackupArtifact>> {
        let mut artifacts: Vec<BackupArtifact> = self
            .entry_names()?
            .into_iter()
            .filter_map(|name| {
                let (kind, created_at, log_segment) = namer.parse(&name)?;
                Some(BackupArtifact {
                    kind,
                    created_at,
                    log_segment,
                    path: self.root.join(&name),
                })
            })
            .collect();

        artifacts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(artifacts)
    }

    fn unavailable(&self, error: std::io::Error) -> BinbakError {
        BinbakError::DestinationUnavailable {
            path: self.root.clone(),
            reason: error.to_string(),
        }
    }
}

/// True when any name contains the marker. Absence is only concluded after
/// every name has been examined; a mismatch never ends the scan.
pub fn contains_marker<I, S>(names: I, marker: &str) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().any(|name| name.as_ref().contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ArtifactKind;
    use tempfile::tempdir;

    const FULL: &str = "full.bkp";

    #[test]
    fn test_marker_found_regardless_of_position() {
        let mut names: Vec<String> = (0..50).map(|i| format!("photo-{i}.jpg")).collect();
        names.push("full.bkp-2024.01.01_01.00.00[binlog.000001].sql".to_string());

        // Every rotation of the listing puts the match somewhere else
        for shift in 0..names.len() {
            let mut listing = names.clone();
            listing.rotate_left(shift);
            assert!(contains_marker(&listing, FULL), "shift {shift}");
        }
    }

    #[test]
    fn test_marker_absent() {
        let names = ["incr.bkp-2024.01.01_01.00.00[binlog.000002].sql", "notes.txt"];
        assert!(!contains_marker(names, FULL));
        assert!(!contains_marker(Vec::<String>::new(), FULL));
    }

    #[test]
    fn test_has_full_backup_scans_directory() {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path());
        assert!(!store.has_full_backup(FULL).unwrap());

        fs::write(dir.path().join("a.txt"), b"x").unwrap();
        fs::write(dir.path().join("z.txt"), b"x").unwrap();
        assert!(!store.has_full_backup(FULL).unwrap());

        fs::write(
            dir.path().join("full.bkp-2024.01.01_01.00.00[binlog.000001].sql"),
            b"dump",
        )
        .unwrap();
        assert!(store.has_full_backup(FULL).unwrap());
    }

    #[test]
    fn test_missing_destination() {
        let dir = tempdir().unwrap();
        let store = DestinationStore::new(dir.path().join("unmounted"));
        assert!(matches!(
            store.has_full_backup(FULL),
            Err(BinbakError::DestinationUnavailable { .. })
        ));
    }

    #[test]
    fn test_list_artifacts_sorted() {
        let dir = tempdir().unwrap();
        for name in [
            "incr.bkp-2024.01.02_01.00.00[binlog.000002].sql",
            "full.bkp-2024.01.01_01.00.00[binlog.000001].sql",
            "README",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let namer = ArtifactNamer {
            full_prefix: "full.bkp".to_string(),
            incremental_prefix: "incr.bkp".to_string(),
            extension: "sql".to_string(),
            max_filename_length: 255,
        };
        let artifacts = DestinationStore::new(dir.path())
            .list_artifacts(&namer)
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].kind, ArtifactKind::Full);
        assert_eq!(artifacts[0].log_segment, "binlog.000001");
        assert_eq!(artifacts[1].kind, ArtifactKind::Incremental);
        assert_eq!(artifacts[1].log_segment, "binlog.000002");
    }
}
