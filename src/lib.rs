pub mod binlog;
pub mod capacity;
pub mod config;
pub mod database;
pub mod dump;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logging;
pub mod naming;
pub mod schedule;
pub mod signal;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use binlog::{last_segment, normalize_segment, PathConvention};
pub use capacity::{estimate_size_mb, has_sufficient_space};
pub use config::{default_config, dump_config, load_config, load_config_from, Config};
pub use database::{Database, DatabaseState, MysqlClient, SchemaSize};
pub use dump::{DumpReport, Dumper, MysqlDump};
pub use engine::{BackupEngine, BackupPath, RunPlan, RunReport, RunState};
pub use error::BinbakError;
pub use executor::{run_full, run_incremental, BackupResult};
pub use naming::{ArtifactKind, ArtifactNamer, BackupArtifact};
pub use schedule::{run_scheduled, DailySchedule};
pub use signal::RunContext;
pub use store::DestinationStore;

/// Main library result type
pub type Result<T> = std::result::Result<T, BinbakError>;
