use crate::binlog::PathConvention;
use crate::database::{Database, SchemaSize};
use crate::dump::{DumpReport, Dumper};
use crate::error::BinbakError;
use crate::naming::ArtifactNamer;
use crate::Result;
use std::cell::Cell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const INDEX_NAME: &str = "binlog.index";

pub fn namer() -> ArtifactNamer {
    ArtifactNamer {
        full_prefix: "full.bkp".to_string(),
        incremental_prefix: "incr.bkp".to_string(),
        extension: "sql".to_string(),
        max_filename_length: 255,
    }
}

/// A binary log directory with an index file in the host's format
pub struct LogFixture {
    dir: TempDir,
}

impl LogFixture {
    pub fn new(segments: &[&str]) -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::write(fixture.dir().join(INDEX_NAME), "").unwrap();
        for segment in segments {
            append_segment(fixture.dir(), segment);
        }
        fixture
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn contents(&self, segment: &str) -> Vec<u8> {
        fs::read(self.dir().join(segment)).unwrap()
    }

    pub fn current_segment(&self) -> String {
        crate::binlog::last_segment(self.dir(), INDEX_NAME, PathConvention::host()).unwrap()
    }
}

fn index_entry(dir: &Path, segment: &str) -> String {
    match PathConvention::host() {
        PathConvention::Posix => dir.join(segment).display().to_string(),
        PathConvention::Windows => format!(".\\{segment}"),
    }
}

fn append_segment(dir: &Path, segment: &str) {
    fs::write(dir.join(segment), format!("events of {segment}\n")).unwrap();
    let mut index = fs::OpenOptions::new()
        .append(true)
        .open(dir.join(INDEX_NAME))
        .unwrap();
    writeln!(index, "{}", index_entry(dir, segment)).unwrap();
}

/// `binlog.000007` -> `binlog.000008`
fn next_segment(segment: &str) -> String {
    let (base, number) = segment.rsplit_once('.').unwrap();
    let next: u64 = number.parse::<u64>().unwrap() + 1;
    format!("{base}.{next:0width$}", width = number.len())
}

/// In-memory stand-in for the database server
pub struct FakeDatabase {
    pub reachable: bool,
    pub log_bin: Option<String>,
    pub log_bin_basename: Option<String>,
    pub sizes: Vec<SchemaSize>,
    pub fail_queries: bool,
    pub fail_rotation: bool,
    log_dir: Option<PathBuf>,
    rotations: Cell<usize>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self {
            reachable: true,
            log_bin: Some("ON".to_string()),
            log_bin_basename: None,
            sizes: Vec::new(),
            fail_queries: false,
            fail_rotation: false,
            log_dir: None,
            rotations: Cell::new(0),
        }
    }

    /// A server writing its binary logs into the fixture's directory
    pub fn with_logs(logs: &LogFixture) -> Self {
        let mut db = Self::new();
        db.log_bin_basename = Some(logs.dir().join("binlog").display().to_string());
        db.log_dir = Some(logs.dir().to_path_buf());
        db.sizes = vec![SchemaSize {
            schema: "shop".to_string(),
            size_mb: 0.5,
        }];
        db
    }

    pub fn rotations(&self) -> usize {
        self.rotations.get()
    }

    fn check_queries(&self) -> Result<()> {
        if self.fail_queries {
            return Err(BinbakError::database("server has gone away"));
        }
        Ok(())
    }
}

impl Database for FakeDatabase {
    fn probe(&self) -> Result<()> {
        if !self.reachable {
            return Err(BinbakError::ConnectionUnreachable {
                reason: "Can't connect to MySQL server on 'localhost'".to_string(),
            });
        }
        Ok(())
    }

    fn variable(&self, name: &str) -> Result<Option<String>> {
        self.check_queries()?;
        Ok(match name {
            "log_bin" => self.log_bin.clone(),
            "log_bin_basename" => self.log_bin_basename.clone(),
            _ => None,
        })
    }

    fn schema_sizes(&self) -> Result<Vec<SchemaSize>> {
        self.check_queries()?;
        Ok(self.sizes.clone())
    }

    fn rotate_logs(&self) -> Result<()> {
        self.check_queries()?;
        if self.fail_rotation {
            return Err(BinbakError::database("FLUSH LOGS denied"));
        }
        if let Some(dir) = &self.log_dir {
            let current =
                crate::binlog::last_segment(dir, INDEX_NAME, PathConvention::host())?;
            append_segment(dir, &next_segment(&current));
        }
        self.rotations.set(self.rotations.get() + 1);
        Ok(())
    }
}

/// In-memory stand-in for the dump tool
pub struct FakeDumper {
    pub output: Vec<u8>,
    pub stderr: String,
    pub success: bool,
    pub spawn_error: bool,
    calls: Cell<usize>,
}

impl FakeDumper {
    pub fn succeeding(output: &[u8]) -> Self {
        Self {
            output: output.to_vec(),
            stderr: String::new(),
            success: true,
            spawn_error: false,
            calls: Cell::new(0),
        }
    }

    pub fn failing(output: &[u8], stderr: &str) -> Self {
        Self {
            output: output.to_vec(),
            stderr: stderr.to_string(),
            success: false,
            spawn_error: false,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Dumper for FakeDumper {
    fn dump(&self, mut output: File) -> Result<DumpReport> {
        self.calls.set(self.calls.get() + 1);
        if self.spawn_error {
            return Err(BinbakError::DumpProcessFailed {
                stderr: "failed to start mysqldump: No such file or directory".to_string(),
            });
        }
        output.write_all(&self.output)?;
        Ok(DumpReport {
            success: self.success,
            stderr: self.stderr.clone(),
        })
    }
}

#[test]
fn test_next_segment() {
    assert_eq!(next_segment("binlog.000007"), "binlog.000008");
    assert_eq!(next_segment("host-bin.000999"), "host-bin.001000");
}
