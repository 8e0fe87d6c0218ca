use anyhow::Context;
use binbak::capacity::format_size;
use binbak::config::resolve_config_path;
use binbak::logging::init_logging;
use binbak::{
    dump_config, load_config_from, run_scheduled, BackupArtifact, BackupEngine, BinbakError,
    Config, DailySchedule, Database, DestinationStore, Dumper, MysqlClient, MysqlDump, RunContext,
    RunPlan,
};
use chrono::Local;
use clap::{Arg, ArgAction, Command};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

fn main() {
    match run() {
        Ok(exit_code) => process::exit(exit_code),
        Err(error) => {
            eprintln!("Error: {error:#}");

            if let Some(binbak_error) = error.downcast_ref::<BinbakError>() {
                let suggestions = binbak_error.suggestions();
                if !suggestions.is_empty() {
                    eprintln!("\nSuggestions:");
                    for suggestion in suggestions {
                        eprintln!("  - {suggestion}");
                    }
                }
                process::exit(binbak_error.exit_code());
            }

            process::exit(1);
        }
    }
}

/// Stdout status lines, honouring --quiet and --verbose
#[derive(Debug, Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn status(&self, message: &str) {
        self.emit(&mut io::stdout().lock(), message, false);
    }

    fn detail(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("  {message}");
        }
    }

    /// Failures print even with --quiet
    fn failure(&self, message: &str) {
        self.emit(&mut io::stdout().lock(), message, true);
    }

    fn emit<W: Write>(&self, out: &mut W, message: &str, always: bool) {
        if always || !self.quiet {
            let _ = writeln!(out, "{} - {message}", stamp());
        }
    }
}

fn stamp() -> String {
    Local::now().format("%Y.%m.%d_%H.%M.%S").to_string()
}

fn run() -> anyhow::Result<i32> {
    let matches = Command::new("binbak")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scheduled full and binary-log incremental MySQL backups onto external storage")
        .long_about(
            "binbak takes a full mysqldump snapshot when the backup media holds no full\n\
             backup yet, and otherwise rotates the binary log and copies the sealed segment.\n\
             Example: full.bkp-2024.06.10_01.00.00[binlog.000042].sql",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the configuration file")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("schedule")
                .long("schedule")
                .help("Keep running and back up daily at the configured time")
                .action(ArgAction::SetTrue)
                .conflicts_with_all(["dry-run", "list"]),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("Show which backup would run without doing it")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("List the backups on the destination and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Show detailed progress information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress all output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose"),
        )
        .arg(
            Arg::new("dump-config")
                .long("dump-config")
                .help("Display current configuration settings and exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let output = Output {
        quiet: matches.get_flag("quiet"),
        verbose: matches.get_flag("verbose"),
    };

    let config_path = resolve_config_path(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let config = load_config_from(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if matches.get_flag("dump-config") {
        dump_config(&config, &config_path)?;
        return Ok(0);
    }

    if matches.get_flag("list") {
        list_backups(&config)?;
        return Ok(0);
    }

    init_logging(&config.log_file, &config.log_level).with_context(|| {
        format!("Failed to open log file {}", config.log_file.display())
    })?;

    let context = RunContext::new();
    setup_signal_handler(&context)?;

    let db = MysqlClient::new(&config.mysql, config.defaults_file.clone())?;
    let dumper = MysqlDump::new(
        &config.mysqldump,
        config.defaults_file.clone(),
        &config.log_position_option,
        config.dump_timeout(),
        context.interrupt_flag(),
    )?;
    let engine = BackupEngine::new(db, dumper, config.clone(), context.clone());

    if matches.get_flag("dry-run") {
        let plan = engine.plan()?;
        println!("{}", plan_line(&plan, &config.destination));
        output.detail(&format!("log directory: {}", plan.log_dir.display()));
        output.detail(&format!("index file: {}", plan.index_file));
        return Ok(0);
    }

    if matches.get_flag("schedule") {
        let schedule = DailySchedule::new(config.schedule_hour, config.schedule_minute)?;
        output.status(&format!(
            "binbak is running; daily backup at {:02}:{:02}. Press Ctrl+C to exit.",
            config.schedule_hour, config.schedule_minute
        ));
        run_scheduled(&schedule, &context, || {
            run_once(&engine, output);
        });
        return Ok(if context.is_interrupted() { 130 } else { 0 });
    }

    let exit_code = run_once(&engine, output);
    if context.is_interrupted() {
        return Ok(130);
    }
    Ok(exit_code)
}

/// One engine run with status lines; returns the process exit code
fn run_once<D: Database, M: Dumper>(engine: &BackupEngine<D, M>, output: Output) -> i32 {
    let report = match engine.run() {
        Ok(report) => report,
        Err(error) => {
            output.failure(&precondition_message(&error));
            return error.exit_code();
        }
    };

    match &report.outcome {
        Ok(result) => {
            output.status(&result.summary());
            output.detail(&format!("log segment: {}", result.artifact.log_segment));
            output.detail(&format!("duration: {:.2}s", result.duration.as_secs_f64()));
            0
        }
        Err(error) => {
            output.failure(&format!(
                "{} backup failed: {error}. Check the logs.",
                capitalize(report.plan.path.label())
            ));
            error.exit_code()
        }
    }
}

fn precondition_message(error: &BinbakError) -> String {
    match error {
        BinbakError::ConnectionUnreachable { .. } => {
            "Database not reachable. Check the logs for more information.".to_string()
        }
        BinbakError::LogCaptureDisabled => "Binary log option is not ON.".to_string(),
        BinbakError::IndexUnavailable { .. } => format!("Index file not found. {error}"),
        other => other.to_string(),
    }
}

fn plan_line(plan: &RunPlan, destination: &Path) -> String {
    format!(
        "Would create {} backup of log segment {} in {}",
        plan.path.label(),
        plan.segment,
        destination.display()
    )
}

fn artifact_line(artifact: &BackupArtifact, size: Option<u64>) -> String {
    format!(
        "{:<12} {}  {:<20} {:>10}  {}",
        artifact.kind.label(),
        artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
        artifact.log_segment,
        size.map(format_size).unwrap_or_else(|| "?".to_string()),
        artifact
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn list_backups(config: &Config) -> binbak::Result<()> {
    let store = DestinationStore::new(&config.destination);
    let artifacts = store.list_artifacts(&config.namer())?;

    if artifacts.is_empty() {
        println!("No backups in {}", store.root().display());
        return Ok(());
    }

    for artifact in &artifacts {
        let size = std::fs::metadata(&artifact.path).ok().map(|m| m.len());
        println!("{}", artifact_line(artifact, size));
    }
    println!("{} backup(s) in {}", artifacts.len(), store.root().display());
    Ok(())
}

fn setup_signal_handler(context: &RunContext) -> anyhow::Result<()> {
    let handler_context = context.clone();
    ctrlc::set_handler(move || {
        if handler_context.is_interrupted() {
            // Second Ctrl+C: do not wait for the current step
            for path in handler_context.discard_empty_artifacts() {
                eprintln!("Removed empty backup: {}", path.display());
            }
            process::exit(130);
        }
        handler_context.set_interrupted(true);
        info!("interrupt received");
        eprintln!("\nInterrupted by user. Finishing the current step...");
    })
    .context("Error setting Ctrl-C handler")
}
