use crate::error::BinbakError;
use crate::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use which::which;

/// One row of the per-schema size aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSize {
    pub schema: String,
    pub size_mb: f64,
}

/// Database facts gathered at the start of a run. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseState {
    pub reachable: bool,
    pub log_capture_enabled: bool,
    pub total_size_mb: Option<f64>,
}

/// What the backup engine needs from the database server
pub trait Database {
    /// Lightweight status query proving the server answers
    fn probe(&self) -> Result<()>;

    /// Value of a server variable, `None` when the server does not know it
    fn variable(&self, name: &str) -> Result<Option<String>>;

    /// (data + index) size per schema, in MB rounded to two decimals
    fn schema_sizes(&self) -> Result<Vec<SchemaSize>>;

    /// Seal the current binary log segment and open a new one
    fn rotate_logs(&self) -> Result<()>;
}

/// Whether the server is writing binary logs
pub fn log_capture_enabled<D: Database + ?Sized>(db: &D) -> Result<bool> {
    Ok(db
        .variable("log_bin")?
        .map(|value| value.trim().eq_ignore_ascii_case("ON"))
        .unwrap_or(false))
}

/// Locate an executable either by explicit path or on `PATH`
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(BinbakError::ToolNotFound {
                program: program.to_string(),
            })
        };
    }

    which(program).map_err(|_| BinbakError::ToolNotFound {
        program: program.to_string(),
    })
}

const SCHEMA_SIZE_QUERY: &str = "SELECT table_schema, \
     ROUND(SUM(data_length + index_length) / 1024 / 1024, 2) \
     FROM information_schema.tables GROUP BY table_schema";

/// `Database` backed by the `mysql` command-line client in batch mode
#[derive(Debug, Clone)]
pub struct MysqlClient {
    program: PathBuf,
    defaults_file: Option<PathBuf>,
}

impl MysqlClient {
    pub fn new(program: &str, defaults_file: Option<PathBuf>) -> Result<Self> {
        Ok(Self {
            program: resolve_program(program)?,
            defaults_file,
        })
    }

    /// Run one statement, returning its rows as tab-separated columns
    fn query(&self, statement: &str) -> Result<Vec<Vec<String>>> {
        let mut command = Command::new(&self.program);
        // --defaults-file must be the first option
        if let Some(defaults_file) = &self.defaults_file {
            command.arg(format!("--defaults-file={}", defaults_file.display()));
        }
        command
            .arg("--batch")
            .arg("--skip-column-names")
            .arg(format!("--execute={statement}"));

        debug!(statement, "running mysql statement");
        let output = command.output().map_err(|e| {
            BinbakError::database(format!("failed to run {}: {e}", self.program.display()))
        })?;

        if !output.status.success() {
            return Err(BinbakError::database(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_batch_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Database for MysqlClient {
    fn probe(&self) -> Result<()> {
        let rows = self
            .query("SHOW STATUS LIKE 'Uptime'")
            .map_err(|e| BinbakError::ConnectionUnreachable {
                reason: e.to_string(),
            })?;
        if rows.is_empty() {
            return Err(BinbakError::ConnectionUnreachable {
                reason: "status query returned no rows".to_string(),
            });
        }
        Ok(())
    }

    fn variable(&self, name: &str) -> Result<Option<String>> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(BinbakError::validation(format!(
                "Invalid server variable name: {name}"
            )));
        }

        let rows = self.query(&format!("SHOW VARIABLES LIKE '{name}'"))?;
        Ok(rows
            .into_iter()
            .find(|row| row.first().map(String::as_str) == Some(name))
            .and_then(|row| row.into_iter().nth(1)))
    }

    fn schema_sizes(&self) -> Result<Vec<SchemaSize>> {
        let rows = self.query(SCHEMA_SIZE_QUERY)?;
        rows.into_iter()
            .map(|row| -> Result<SchemaSize> {
                let schema = row.first().cloned().unwrap_or_default();
                let raw = row.get(1).map(String::as_str).unwrap_or("NULL");
                let size_mb = if raw == "NULL" {
                    0.0
                } else {
                    raw.parse().map_err(|_| {
                        BinbakError::database(format!("invalid size {raw:?} for schema {schema}"))
                    })?
                };
                Ok(SchemaSize { schema, size_mb })
            })
            .collect()
    }

    fn rotate_logs(&self) -> Result<()> {
        self.query("FLUSH LOGS").map(|_| ())
    }
}

fn parse_batch_output(stdout: &str) -> Vec<Vec<String>> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDatabase;

    #[test]
    fn test_parse_batch_output() {
        let rows = parse_batch_output("mysql\t2.45\nshop\t120.00\n\n");
        assert_eq!(
            rows,
            vec![
                vec!["mysql".to_string(), "2.45".to_string()],
                vec!["shop".to_string(), "120.00".to_string()],
            ]
        );
        assert!(parse_batch_output("").is_empty());
    }

    #[test]
    fn test_log_capture_enabled() {
        let mut db = FakeDatabase::new();
        db.log_bin = Some("ON".to_string());
        assert!(log_capture_enabled(&db).unwrap());

        db.log_bin = Some("OFF".to_string());
        assert!(!log_capture_enabled(&db).unwrap());

        db.log_bin = None;
        assert!(!log_capture_enabled(&db).unwrap());
    }

    #[test]
    fn test_resolve_program_missing() {
        let result = resolve_program("/definitely/not/here/mysqldump");
        assert!(matches!(result, Err(BinbakError::ToolNotFound { .. })));

        let result = resolve_program("binbak-no-such-tool-on-path");
        assert!(matches!(result, Err(BinbakError::ToolNotFound { .. })));
    }

    #[test]
    fn test_resolve_program_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("mysqldump");
        std::fs::write(&tool, b"#!/bin/sh\n").unwrap();
        assert_eq!(resolve_program(tool.to_str().unwrap()).unwrap(), tool);
    }
}
