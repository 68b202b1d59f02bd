//! `calm config` command - Configuration management
//!
//! Provides commands to view and modify the server connection settings and
//! the cache location.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::Path;

use crate::cli::GlobalOpts;
use crate::core::config::{CONFIG_FILE_ENV, DB_LOCATION_ENV};
use crate::core::{Config, ConfigError};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration values
    Show(ShowArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Unset (remove) a configuration value
    Unset(UnsetArgs),

    /// Show the path of the configuration file
    Path,

    /// List all available configuration keys
    Keys,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Show only this key's value
    pub key: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., pc_ip, username)
    pub key: String,

    /// Value to set
    pub value: String,
}

#[derive(clap::Args, Debug)]
pub struct UnsetArgs {
    /// Configuration key to remove
    pub key: String,
}

/// Valid configuration keys
const VALID_KEYS: &[(&str, &str)] = &[
    ("pc_ip", "Prism Central host or IP address"),
    ("pc_port", "Prism Central port (default 9440)"),
    ("username", "API username"),
    ("password", "API password"),
    ("verify_tls", "Verify the server certificate (default false)"),
    ("timeout_secs", "HTTP request timeout in seconds (default 30)"),
    ("db_location", "Path of the cache database file"),
];

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, _global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => run_show(args),
        ConfigCommands::Set(args) => run_set(args),
        ConfigCommands::Unset(args) => run_unset(args),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Keys => run_keys(),
    }
}

fn run_show(args: ShowArgs) -> Result<()> {
    let config = Config::load()?;

    // If a specific key is requested, show just that value
    if let Some(key) = &args.key {
        validate_key(key)?;
        let value = get_config_value(&config, key);
        if let Some(v) = value {
            println!("{}", v);
        } else {
            return Err(miette::miette!("Key '{}' is not set", key));
        }
        return Ok(());
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();

    for (key, _) in VALID_KEYS {
        print_config_value(key, get_config_value(&config, key).as_deref());
    }

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Environment variables (CALM_DSL_PC_IP, CALM_DSL_PC_PORT, CALM_DSL_PC_USERNAME,");
    println!("     CALM_DSL_PC_PASSWORD, {})", DB_LOCATION_ENV);
    println!(
        "  2. Config file ({})",
        Config::global_config_path()?.display()
    );

    Ok(())
}

fn run_set(args: SetArgs) -> Result<()> {
    validate_key(&args.key)?;
    let config_path = Config::global_config_path()?;

    let value = typed_value(&args.key, &args.value)?;
    let mut config_map = read_config_map(&config_path)?;
    config_map.insert(serde_yml::Value::String(args.key.clone()), value);

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let shown = if args.key == "password" {
        "********".to_string()
    } else {
        args.value.clone()
    };
    println!(
        "{} Set {} {} {}",
        style("✓").green(),
        style(&args.key).cyan(),
        style("→").dim(),
        style(shown).yellow(),
    );

    Ok(())
}

fn run_unset(args: UnsetArgs) -> Result<()> {
    validate_key(&args.key)?;
    let config_path = Config::global_config_path()?;

    if !config_path.exists() {
        return Err(miette::miette!(
            "Config file does not exist: {}",
            config_path.display()
        ));
    }

    let mut config_map = read_config_map(&config_path)?;

    let removed = config_map
        .remove(&serde_yml::Value::String(args.key.clone()))
        .is_some();

    if !removed {
        return Err(miette::miette!("Key '{}' not found in config", args.key));
    }

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    println!("{} Removed {}", style("✓").green(), style(&args.key).cyan());

    Ok(())
}

fn run_path() -> Result<()> {
    let path = Config::global_config_path()?;
    println!("{}", path.display());
    Ok(())
}

fn run_keys() -> Result<()> {
    println!("{}", style("Available configuration keys:").bold());
    println!();

    for (key, description) in VALID_KEYS {
        println!("  {:<20} {}", style(key).cyan(), style(description).dim());
    }

    println!();
    println!(
        "{}",
        style("Use 'calm config set <key> <value>' to set a value.").dim()
    );
    println!(
        "{}",
        style(format!("Set {} to use a different config file.", CONFIG_FILE_ENV)).dim()
    );

    Ok(())
}

// Helper functions

fn validate_key(key: &str) -> Result<()> {
    if VALID_KEYS.iter().any(|(k, _)| *k == key) {
        Ok(())
    } else {
        Err(miette::miette!(
            help = "Run `calm config keys` to list valid keys",
            "Unknown configuration key '{}'",
            key
        ))
    }
}

/// Load the config file as a YAML mapping (empty when missing or blank)
///
/// A file that does not parse, or is not a mapping, is an error so that
/// `set`/`unset` never rewrite it from scratch.
fn read_config_map(path: &Path) -> Result<serde_yml::Mapping> {
    if !path.exists() {
        return Ok(serde_yml::Mapping::new());
    }

    let content = fs::read_to_string(path).into_diagnostic()?;
    if content.trim().is_empty() {
        return Ok(serde_yml::Mapping::new());
    }

    let invalid = |message: String| ConfigError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let parsed: serde_yml::Value =
        serde_yml::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    match parsed {
        serde_yml::Value::Null => Ok(serde_yml::Mapping::new()),
        serde_yml::Value::Mapping(map) => Ok(map),
        _ => Err(invalid("expected a mapping of `key: value` pairs".to_string()).into()),
    }
}

/// Convert a command-line string to the YAML type the key deserializes from
fn typed_value(key: &str, value: &str) -> Result<serde_yml::Value> {
    match key {
        "pc_port" => value
            .parse::<u16>()
            .map(|n| serde_yml::Value::Number(u64::from(n).into()))
            .map_err(|_| miette::miette!("'{}' expects a port number, got '{}'", key, value)),
        "timeout_secs" => value
            .parse::<u64>()
            .map(|n| serde_yml::Value::Number(n.into()))
            .map_err(|_| miette::miette!("'{}' expects a number, got '{}'", key, value)),
        "verify_tls" => value
            .parse::<bool>()
            .map(serde_yml::Value::Bool)
            .map_err(|_| miette::miette!("'{}' expects true or false, got '{}'", key, value)),
        _ => Ok(serde_yml::Value::String(value.to_string())),
    }
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "pc_ip" => config.pc_ip.clone(),
        "pc_port" => Some(config.port().to_string()),
        "username" => config.username.clone(),
        "password" => config.password.as_ref().map(|_| "********".to_string()),
        "verify_tls" => Some(config.verify_tls().to_string()),
        "timeout_secs" => Some(config.timeout_secs().to_string()),
        "db_location" => config.db_path().ok().map(|p| p.display().to_string()),
        _ => None,
    }
}

fn print_config_value(key: &str, value: Option<&str>) {
    if let Some(v) = value {
        println!("  {}: {}", style(key).cyan(), style(v).yellow());
    } else {
        println!("  {}: {}", style(key).cyan(), style("(not set)").dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_value() {
        assert_eq!(
            typed_value("pc_port", "9440").unwrap(),
            serde_yml::Value::Number(9440u64.into())
        );
        assert_eq!(
            typed_value("verify_tls", "true").unwrap(),
            serde_yml::Value::Bool(true)
        );
        assert_eq!(
            typed_value("pc_ip", "10.0.0.1").unwrap(),
            serde_yml::Value::String("10.0.0.1".to_string())
        );
        assert!(typed_value("pc_port", "abc").is_err());
        assert!(typed_value("verify_tls", "maybe").is_err());
    }

    #[test]
    fn test_read_config_map() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        assert!(read_config_map(&path).unwrap().is_empty());

        fs::write(&path, "pc_ip: 10.0.0.5\nusername: admin\n").unwrap();
        assert_eq!(read_config_map(&path).unwrap().len(), 2);

        fs::write(&path, "pc_ip: 10.0.0.5\n  bad: [\n").unwrap();
        assert!(read_config_map(&path).is_err());

        fs::write(&path, "just a string\n").unwrap();
        assert!(read_config_map(&path).is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("pc_ip").is_ok());
        assert!(validate_key("author").is_err());
    }

    #[test]
    fn test_password_is_masked() {
        let config = Config {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            get_config_value(&config, "password").as_deref(),
            Some("********")
        );
    }
}
