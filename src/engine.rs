use crate::binlog::{
    find_index_file, index_stem_from_basename, last_segment, log_dir_from_basename,
    PathConvention,
};
use crate::capacity::{check_capacity, estimate_size_mb};
use crate::config::Config;
use crate::database::{log_capture_enabled, Database, DatabaseState};
use crate::dump::Dumper;
use crate::error::BinbakError;
use crate::executor::{run_full, run_incremental, BackupResult};
use crate::signal::RunContext;
use crate::store::DestinationStore;
use crate::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    ConnectionChecked,
    LogCaptureChecked,
    IndexResolved,
    FullPath,
    IncrementalPath,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupPath {
    Full,
    Incremental,
}

impl BackupPath {
    pub fn label(&self) -> &'static str {
        match self {
            BackupPath::Full => "full",
            BackupPath::Incremental => "incremental",
        }
    }
}

/// A full backup in the destination is the only reason to go incremental
pub fn select_path(full_backup_exists: bool) -> BackupPath {
    if full_backup_exists {
        BackupPath::Incremental
    } else {
        BackupPath::Full
    }
}

/// Everything decided before an executor runs
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub started_at: DateTime<Local>,
    pub state: DatabaseState,
    pub log_dir: PathBuf,
    pub index_file: String,
    /// Current log segment, read before any rotation
    pub segment: String,
    pub path: BackupPath,
    pub trace: Vec<RunState>,
}

#[derive(Debug)]
pub struct RunReport {
    pub plan: RunPlan,
    pub outcome: Result<BackupResult>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Backup decision engine.
///
/// Each run walks `Start -> ConnectionChecked -> LogCaptureChecked ->
/// IndexResolved -> FullPath | IncrementalPath -> Done`. Every gate before
/// the path split is fatal for the run; failures after it belong to the
/// executor and are reported in the [`RunReport`] instead.
pub struct BackupEngine<D, M> {
    db: D,
    dumper: M,
    config: Config,
    convention: PathConvention,
    context: RunContext,
}

impl<D: Database, M: Dumper> BackupEngine<D, M> {
    pub fn new(db: D, dumper: M, config: Config, context: RunContext) -> Self {
        Self {
            db,
            dumper,
            config,
            convention: PathConvention::host(),
            context,
        }
    }

    pub fn with_convention(mut self, convention: PathConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every precondition gate and choose the path, without writing
    /// anything or rotating logs
    pub fn plan(&self) -> Result<RunPlan> {
        let started_at = Local::now();
        let mut trace = vec![RunState::Start];
        let mut state = DatabaseState::default();

        self.db.probe().map_err(|e| {
            let e = match e {
                BinbakError::ConnectionUnreachable { .. } => e,
                other => BinbakError::ConnectionUnreachable {
                    reason: other.to_string(),
                },
            };
            critical(&e);
            e
        })?;
        state.reachable = true;
        advance(&mut trace, RunState::ConnectionChecked);

        state.log_capture_enabled = log_capture_enabled(&self.db).map_err(fatal)?;
        if !state.log_capture_enabled {
            return Err(fatal(BinbakError::LogCaptureDisabled));
        }
        advance(&mut trace, RunState::LogCaptureChecked);

        let (log_dir, index_file, segment) = self.resolve_index().map_err(fatal)?;
        info!(segment = segment.as_str(), index = index_file.as_str(), "current binary log resolved");
        advance(&mut trace, RunState::IndexResolved);

        let store = DestinationStore::new(&self.config.destination);
        let full_exists = store
            .has_full_backup(&self.config.full_prefix)
            .map_err(fatal)?;
        let path = select_path(full_exists);
        advance(
            &mut trace,
            match path {
                BackupPath::Full => RunState::FullPath,
                BackupPath::Incremental => RunState::IncrementalPath,
            },
        );

        Ok(RunPlan {
            started_at,
            state,
            log_dir,
            index_file,
            segment,
            path,
            trace,
        })
    }

    /// One backup run. `Err` only for precondition failures; executor
    /// failures come back inside the report.
    pub fn run(&self) -> Result<RunReport> {
        let mut plan = self.plan()?;
        info!(path = plan.path.label(), "starting backup");

        let outcome = match plan.path {
            BackupPath::Full => self.execute_full(&mut plan),
            BackupPath::Incremental => run_incremental(
                &self.db,
                &self.config.namer(),
                &self.config.destination,
                &plan.log_dir,
                &plan.segment,
                &plan.started_at,
                &self.context,
            ),
        };

        match &outcome {
            Ok(result) => info!(path = %result.artifact.path.display(), "backup finished"),
            Err(e) => error!(error = %e, path = plan.path.label(), "backup failed"),
        }
        advance(&mut plan.trace, RunState::Done);

        Ok(RunReport { plan, outcome })
    }

    fn execute_full(&self, plan: &mut RunPlan) -> Result<BackupResult> {
        if self.config.check_space {
            let estimate = estimate_size_mb(&self.db)?;
            plan.state.total_size_mb = Some(estimate);
            check_capacity(estimate, &self.config.destination)?;
            debug!(estimate_mb = estimate, "destination has room for a full backup");
        }

        run_full(
            &self.dumper,
            &self.config.namer(),
            &self.config.destination,
            &plan.segment,
            &plan.started_at,
            &self.context,
        )
    }

    fn resolve_index(&self) -> Result<(PathBuf, String, String)> {
        let basename = if self.config.log_dir.is_none() || self.config.index_file.is_none() {
            self.db.variable("log_bin_basename")?.unwrap_or_default()
        } else {
            String::new()
        };

        let log_dir = match &self.config.log_dir {
            Some(dir) => dir.clone(),
            None => log_dir_from_basename(&basename).ok_or_else(|| BinbakError::IndexUnavailable {
                path: PathBuf::from(&basename),
                reason: "server did not report a binary log directory".to_string(),
            })?,
        };

        let index_file = match &self.config.index_file {
            Some(name) => name.clone(),
            None => find_index_file(&log_dir, index_stem_from_basename(&basename).as_deref())?,
        };

        let segment = last_segment(&log_dir, &index_file, self.convention)?;
        Ok((log_dir, index_file, segment))
    }
}

fn advance(trace: &mut Vec<RunState>, next: RunState) {
    debug!(state = ?next, "backup state");
    trace.push(next);
}

fn critical(error: &BinbakError) {
    error!(severity = "critical", error = %error, "backup run aborted");
}

fn fatal(error: BinbakError) -> BinbakError {
    critical(&error);
    error
}
