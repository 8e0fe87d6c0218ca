use crate::error::BinbakError;
use crate::naming::ArtifactNamer;
use crate::Result;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // [destination]
    pub destination: PathBuf,
    pub full_prefix: String,
    pub incremental_prefix: String,
    pub extension: String,
    pub check_space: bool,
    pub max_filename_length: usize,

    // [mysql]
    pub defaults_file: Option<PathBuf>,
    pub mysql: String,
    pub mysqldump: String,
    pub log_dir: Option<PathBuf>,
    pub index_file: Option<String>,
    pub dump_timeout_secs: u64,
    /// mysqldump option that writes the log coordinates into the dump
    pub log_position_option: String,

    // [schedule]
    pub schedule_hour: u32,
    pub schedule_minute: u32,

    // [log]
    pub log_file: PathBuf,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            destination: PathBuf::from("/mnt/backup"),
            full_prefix: "full.bkp".to_string(),
            incremental_prefix: "incr.bkp".to_string(),
            extension: "sql".to_string(),
            check_space: true,
            max_filename_length: 255,
            defaults_file: None,
            mysql: "mysql".to_string(),
            mysqldump: "mysqldump".to_string(),
            log_dir: None,
            index_file: None,
            dump_timeout_secs: 0,
            log_position_option: "--source-data=2".to_string(),
            schedule_hour: 1,
            schedule_minute: 0,
            log_file: PathBuf::from("binbak.log"),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn namer(&self) -> ArtifactNamer {
        ArtifactNamer {
            full_prefix: self.full_prefix.clone(),
            incremental_prefix: self.incremental_prefix.clone(),
            extension: self.extension.clone(),
            max_filename_length: self.max_filename_length,
        }
    }

    /// `None` means wait for the dump without a limit
    pub fn dump_timeout(&self) -> Option<Duration> {
        (self.dump_timeout_secs > 0).then(|| Duration::from_secs(self.dump_timeout_secs))
    }
}

/// Get default configuration
pub fn default_config() -> Config {
    Config::default()
}

/// Load configuration from the platform config path, falling back to defaults
pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from an explicit file; a missing file yields defaults
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Ok(default_config());
    }

    let mut conf = Ini::new();
    conf.load(config_path)
        .map_err(|e| BinbakError::config(format!("Failed to parse config file: {e}")))?;

    let mut config = default_config();

    // [destination]
    if let Some(value) = conf.get("destination", "path") {
        config.destination = PathBuf::from(value);
    }
    if let Some(value) = conf.get("destination", "full_prefix") {
        config.full_prefix = value;
    }
    if let Some(value) = conf.get("destination", "incremental_prefix") {
        config.incremental_prefix = value;
    }
    if let Some(value) = conf.get("destination", "extension") {
        config.extension = value;
    }
    if let Some(value) = conf.get("destination", "check_space") {
        config.check_space = parse_bool(&value).unwrap_or(config.check_space);
    }
    if let Some(value) = conf.get("destination", "max_filename_length") {
        config.max_filename_length = parse_number(&value, "max_filename_length")?;
    }

    // [mysql]
    if let Some(value) = conf.get("mysql", "defaults_file") {
        config.defaults_file = Some(PathBuf::from(value));
    }
    if let Some(value) = conf.get("mysql", "mysql") {
        config.mysql = value;
    }
    if let Some(value) = conf.get("mysql", "mysqldump") {
        config.mysqldump = value;
    }
    if let Some(value) = conf.get("mysql", "log_dir") {
        config.log_dir = Some(PathBuf::from(value));
    }
    if let Some(value) = conf.get("mysql", "index_file") {
        config.index_file = Some(value);
    }
    if let Some(value) = conf.get("mysql", "dump_timeout_secs") {
        config.dump_timeout_secs = parse_number(&value, "dump_timeout_secs")?;
    }
    if let Some(value) = conf.get("mysql", "log_position_option") {
        config.log_position_option = value;
    }

    // [schedule]
    if let Some(value) = conf.get("schedule", "hour") {
        config.schedule_hour = parse_number(&value, "hour")?;
    }
    if let Some(value) = conf.get("schedule", "minute") {
        config.schedule_minute = parse_number(&value, "minute")?;
    }

    // [log]
    if let Some(value) = conf.get("log", "file") {
        config.log_file = PathBuf::from(value);
    }
    if let Some(value) = conf.get("log", "level") {
        config.log_level = value;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.schedule_hour > 23 {
        return Err(BinbakError::config(format!(
            "Invalid hour: {} (expected 0-23)",
            config.schedule_hour
        )));
    }
    if config.schedule_minute > 59 {
        return Err(BinbakError::config(format!(
            "Invalid minute: {} (expected 0-59)",
            config.schedule_minute
        )));
    }
    if config.full_prefix.is_empty() || config.incremental_prefix.is_empty() {
        return Err(BinbakError::config("Backup prefixes must not be empty"));
    }
    if config.full_prefix.contains(&config.incremental_prefix)
        || config.incremental_prefix.contains(&config.full_prefix)
    {
        return Err(BinbakError::config(
            "full_prefix and incremental_prefix must not contain each other",
        ));
    }
    if !config.log_position_option.starts_with("--") {
        return Err(BinbakError::config(format!(
            "Invalid log_position_option: {:?} (expected a mysqldump option such as --source-data=2)",
            config.log_position_option
        )));
    }
    Ok(())
}

/// Get the configuration file path for the current platform
fn get_config_path() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return Ok(PathBuf::from(appdata).join("binbak").join("config.ini"));
        }
    }

    if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
        Ok(PathBuf::from(config_dir).join("binbak").join("config.ini"))
    } else if let Some(home) = std::env::var_os("HOME") {
        Ok(PathBuf::from(home)
            .join(".config")
            .join("binbak")
            .join("config.ini"))
    } else {
        Err(BinbakError::config("Could not determine config directory"))
    }
}

/// Parse a boolean value from INI string
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BinbakError::config(format!("Invalid {key}: {value}")))
}

/// Create a sample configuration file
pub fn create_sample_config() -> String {
    r#"[destination]
# Mount point of the backup media
path = /mnt/backup

# File name markers; a file containing full_prefix means a full backup exists
full_prefix = full.bkp
incremental_prefix = incr.bkp
extension = sql

# Compare the database size with the free space before a full backup
check_space = true
max_filename_length = 255

[mysql]
# Credentials for mysql and mysqldump ([client] section)
defaults_file = /etc/binbak/mysql.cnf
mysql = mysql
mysqldump = mysqldump

# Binary log directory and index file; discovered from the server when unset
# log_dir = /var/lib/mysql
# index_file = binlog.index

# Kill mysqldump after this many seconds (0 = no limit)
dump_timeout_secs = 0

# Records the binary log position in the dump; use --master-data=2 before
# MySQL 8.0.26
log_position_option = --source-data=2

[schedule]
# Daily run time for --schedule (local time)
hour = 1
minute = 0

[log]
file = binbak.log
level = info
"#
    .to_string()
}

/// Display the current configuration in a user-friendly format
pub fn dump_config(config: &Config, config_path: &Path) -> Result<()> {
    println!("binbak Configuration");
    println!("====================");
    println!();

    if config_path.exists() {
        println!("Config file: {} (found)", config_path.display());
    } else {
        println!(
            "Config file: {} (not found, using defaults)",
            config_path.display()
        );
    }
    println!();

    let optional = |value: &Option<PathBuf>| {
        value
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(from server)".to_string())
    };

    println!("Current Settings:");
    println!("----------------");
    println!("destination          = {}", config.destination.display());
    println!("full_prefix          = {}", config.full_prefix);
    println!("incremental_prefix   = {}", config.incremental_prefix);
    println!("extension            = {}", config.extension);
    println!("check_space          = {}", config.check_space);
    println!("max_filename_length  = {}", config.max_filename_length);
    println!(
        "defaults_file        = {}",
        config
            .defaults_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("mysql                = {}", config.mysql);
    println!("mysqldump            = {}", config.mysqldump);
    println!("log_dir              = {}", optional(&config.log_dir));
    println!(
        "index_file           = {}",
        config.index_file.as_deref().unwrap_or("(discovered)")
    );
    println!("dump_timeout_secs    = {}", config.dump_timeout_secs);
    println!("log_position_option  = {}", config.log_position_option);
    println!(
        "schedule             = daily at {:02}:{:02}",
        config.schedule_hour, config.schedule_minute
    );
    println!("log_file             = {}", config.log_file.display());
    println!("log_level            = {}", config.log_level);
    println!();

    println!("Example backup names with current settings:");
    println!("------------------------------------------");
    println!(
        "{}-YYYY.MM.DD_HH.MM.SS[binlog.000001].{}",
        config.full_prefix, config.extension
    );
    println!(
        "{}-YYYY.MM.DD_HH.MM.SS[binlog.000002].{}",
        config.incremental_prefix, config.extension
    );

    if !config_path.exists() {
        println!();
        println!("Sample configuration:");
        println!("--------------------");
        print!("{}", create_sample_config());
    }

    Ok(())
}

/// Where the config would be read from: the explicit path or the platform default
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => get_config_path(),
    }
}
