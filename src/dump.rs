use crate::database::resolve_program;
use crate::error::BinbakError;
use crate::Result;
use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Consistent snapshot of every schema, rotating the binary log. The log
/// position option is appended separately since its name depends on the
/// server version.
pub const DUMP_FLAGS: &[&str] = &["--single-transaction", "--flush-logs", "--all-databases"];

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What the dump process reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpReport {
    pub success: bool,
    pub stderr: String,
}

impl DumpReport {
    /// Any error output counts as failure, even with a zero exit status
    pub fn failed(&self) -> bool {
        !self.success || !self.stderr.trim().is_empty()
    }
}

/// Writes a full dump of the database into `output`
pub trait Dumper {
    fn dump(&self, output: File) -> Result<DumpReport>;
}

/// `Dumper` that spawns `mysqldump` with stdout redirected to the artifact
#[derive(Debug, Clone)]
pub struct MysqlDump {
    program: PathBuf,
    defaults_file: Option<PathBuf>,
    log_position_option: String,
    timeout: Option<Duration>,
    interrupt: Arc<AtomicBool>,
}

impl MysqlDump {
    pub fn new(
        program: &str,
        defaults_file: Option<PathBuf>,
        log_position_option: &str,
        timeout: Option<Duration>,
        interrupt: Arc<AtomicBool>,
    ) -> Result<Self> {
        Ok(Self {
            program: resolve_program(program)?,
            defaults_file,
            log_position_option: log_position_option.to_string(),
            timeout,
            interrupt,
        })
    }

    /// Argument vector passed to the process; no shell is involved
    pub fn args(&self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(DUMP_FLAGS.len() + 2);
        if let Some(defaults_file) = &self.defaults_file {
            let mut arg = OsString::from("--defaults-file=");
            arg.push(defaults_file.as_os_str());
            args.push(arg);
        }
        args.extend(DUMP_FLAGS.iter().map(OsString::from));
        args.push(OsString::from(&self.log_position_option));
        args
    }
}

impl Dumper for MysqlDump {
    fn dump(&self, output: File) -> Result<DumpReport> {
        debug!(program = %self.program.display(), args = ?self.args(), "starting dump");

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BinbakError::DumpProcessFailed {
                stderr: format!("failed to start {}: {e}", self.program.display()),
            })?;

        // Drain stderr concurrently so the child never blocks on a full pipe
        let stderr_pipe = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut buffer = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buffer);
            }
            buffer
        });

        let started = Instant::now();
        let mut cancelled = None;
        let waited = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(Some(status)),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "lost track of dump process; killing it");
                    stop_child(&mut child);
                    break Err(e);
                }
            }
            if self.interrupt.load(Ordering::SeqCst) {
                cancelled = Some("dump cancelled by interrupt".to_string());
            } else if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    cancelled = Some(format!("dump timed out after {}s", limit.as_secs()));
                }
            }
            if let Some(reason) = &cancelled {
                warn!(reason = reason.as_str(), "killing dump process");
                stop_child(&mut child);
                break Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        };

        // The pipe closes once the child is gone, so the reader always ends
        let mut stderr = reader.join().unwrap_or_default();
        let status = waited?;
        if let Some(reason) = cancelled {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&reason);
        }

        Ok(DumpReport {
            success: status.map(|s| s.success()).unwrap_or(false),
            stderr,
        })
    }
}

fn stop_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dumper(program: PathBuf, defaults_file: Option<PathBuf>) -> MysqlDump {
        MysqlDump {
            program,
            defaults_file,
            log_position_option: "--source-data=2".to_string(),
            timeout: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_args_with_defaults_file_first() {
        let args = dumper(
            PathBuf::from("mysqldump"),
            Some(PathBuf::from("/etc/binbak/my cnf.cnf")),
        )
        .args();
        assert_eq!(args[0], OsString::from("--defaults-file=/etc/binbak/my cnf.cnf"));
        assert_eq!(
            &args[1..=DUMP_FLAGS.len()],
            DUMP_FLAGS.iter().map(OsString::from).collect::<Vec<_>>().as_slice()
        );
        assert_eq!(args.last(), Some(&OsString::from("--source-data=2")));
    }

    #[test]
    fn test_args_without_defaults_file() {
        let mut fake = dumper(PathBuf::from("mysqldump"), None);
        fake.log_position_option = "--master-data=2".to_string();
        let args = fake.args();
        assert_eq!(args.len(), DUMP_FLAGS.len() + 1);
        assert!(args.contains(&OsString::from("--single-transaction")));
        assert!(args.contains(&OsString::from("--master-data=2")));
        assert!(!args.contains(&OsString::from("--source-data=2")));
    }

    #[test]
    fn test_report_failed() {
        let ok = DumpReport {
            success: true,
            stderr: String::new(),
        };
        assert!(!ok.failed());

        let warned = DumpReport {
            success: true,
            stderr: "mysqldump: Error: access denied\n".to_string(),
        };
        assert!(warned.failed());

        let whitespace = DumpReport {
            success: true,
            stderr: "  \n".to_string(),
        };
        assert!(!whitespace.failed());

        let exit_code = DumpReport {
            success: false,
            stderr: String::new(),
        };
        assert!(exit_code.failed());
    }

    #[cfg(unix)]
    #[test]
    fn test_dump_reports_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.sql");
        let output = File::create(&out_path).unwrap();

        // A shell rejects the dump flags as unknown options, which exercises
        // the stderr capture and exit status handling
        let mut fake = dumper(PathBuf::from("/bin/sh"), None);
        fake.timeout = Some(Duration::from_secs(30));

        let report = fake.dump(output).unwrap();
        assert!(report.failed());
        assert!(!report.stderr.trim().is_empty());
        assert_eq!(std::fs::metadata(&out_path).unwrap().len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_dump_killed_on_interrupt() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-dump");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut fake = dumper(script, None);
        fake.interrupt.store(true, Ordering::SeqCst);

        let started = Instant::now();
        // Exec of a freshly written script can briefly fail with ETXTBSY
        let report = (0..5)
            .find_map(|_| {
                let output = File::create(dir.path().join("out.sql")).unwrap();
                match fake.dump(output) {
                    Ok(report) => Some(report),
                    Err(_) => {
                        thread::sleep(Duration::from_millis(50));
                        None
                    }
                }
            })
            .unwrap();

        assert!(report.failed());
        assert!(report.stderr.contains("dump cancelled by interrupt"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_dump_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let output = File::create(dir.path().join("out.sql")).unwrap();
        let fake = dumper(dir.path().join("no-such-mysqldump"), None);

        assert!(matches!(
            fake.dump(output),
            Err(BinbakError::DumpProcessFailed { .. })
        ));
    }
}
