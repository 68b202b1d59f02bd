//! `calm cache` command - Manage the entity name cache
//!
//! The cache is a local SQLite database that maps entity names to UUIDs
//! for every registered entity type (accounts, projects, subnets, ...).
//!
//! It is never refreshed implicitly: lookups that miss tell the user to run
//! `calm cache update`.

use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::args::OutputFormat;
use crate::cli::helpers::{format_timestamp, parse_key_value, truncate_str};
use crate::cli::GlobalOpts;
use crate::core::cache::{CacheEntry, CacheError, EntityCache, SyncOutcome};
use crate::core::client::CalmClient;
use crate::core::entity_type::EntityType;
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Refresh the cache from the server (all types, or one with --type)
    Update {
        /// Entity type to refresh (e.g. ACCOUNT, AHV_SUBNET)
        #[arg(long = "type", short = 't')]
        entity_type: Option<String>,
    },

    /// Remove every cached entry
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show cached entries
    Show {
        /// Only show this entity type
        #[arg(long = "type", short = 't')]
        entity_type: Option<String>,
    },

    /// Look up a cached entity by name or UUID
    Get(GetArgs),

    /// Fetch one entity from the server and cache it
    Add {
        /// Entity type
        entity_type: String,

        /// UUID of the entity on the server
        uuid: String,
    },

    /// Remove one entity from the cache
    Delete {
        /// Entity type
        entity_type: String,

        /// UUID of the cached entity
        uuid: String,
    },

    /// Show cache location and statistics
    Status,

    /// Delete the cache database file
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Entity type (e.g. ACCOUNT, AHV_SUBNET)
    pub entity_type: String,

    /// Entity name
    #[arg(required_unless_present = "uuid")]
    pub name: Option<String>,

    /// Look up by UUID instead of name
    #[arg(long, conflicts_with = "name")]
    pub uuid: Option<String>,

    /// Disambiguating attribute (e.g. --attr cluster=clusterA), repeatable
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub attrs: Vec<(String, String)>,
}

pub fn run(cmd: CacheCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CacheCommands::Update { entity_type } => run_update(entity_type.as_deref(), global),
        CacheCommands::Clear { yes } => run_clear(yes, global),
        CacheCommands::Show { entity_type } => run_show(entity_type.as_deref(), global),
        CacheCommands::Get(args) => run_get(args, global),
        CacheCommands::Add { entity_type, uuid } => run_add(&entity_type, &uuid, global),
        CacheCommands::Delete { entity_type, uuid } => run_delete(&entity_type, &uuid, global),
        CacheCommands::Status => run_status(),
        CacheCommands::Reset { yes } => run_reset(yes, global),
    }
}

fn open_cache(config: &Config) -> Result<EntityCache> {
    let path = config.db_path()?;
    Ok(EntityCache::open(&path)?)
}

fn parse_type(entity_type: Option<&str>) -> Result<Option<EntityType>> {
    Ok(entity_type.map(str::parse::<EntityType>).transpose()?)
}

fn run_update(entity_type: Option<&str>, global: &GlobalOpts) -> Result<()> {
    // Reject unknown types before anything is purged
    let entity_type = parse_type(entity_type)?;
    let config = Config::load()?;
    let client = CalmClient::from_config(&config)?;
    let mut cache = open_cache(&config)?;

    if !global.quiet {
        match entity_type {
            Some(t) => println!("{} Updating {} cache...", style("→").blue(), t),
            None => println!("{} Updating cache...", style("→").blue()),
        }
    }

    let report = cache.sync(&client, entity_type)?;

    for result in &report.results {
        match &result.outcome {
            SyncOutcome::Refreshed { count } => {
                if !global.quiet {
                    println!("  {:<18} {}", result.entity_type.as_str(), style(count).cyan());
                }
            }
            SyncOutcome::Failed { error } => {
                eprintln!(
                    "{} {} not refreshed: {}",
                    style("Warning:").yellow(),
                    result.entity_type,
                    error
                );
            }
        }
    }

    if report.is_fatal() {
        if let Some((t, error)) = report.failures().next() {
            return Err(miette::miette!(
                help = "Check the server address and credentials with `calm config show`",
                "Failed to update {} cache: {}",
                t,
                error
            ));
        }
    }

    if !global.quiet {
        println!(
            "{} Cache updated in {}ms ({} entries)",
            style("✓").green(),
            report.duration_ms,
            report.total_rows()
        );
    }

    Ok(())
}

fn run_clear(yes: bool, global: &GlobalOpts) -> Result<()> {
    if !confirm("Remove all cached entries?", "clear the cache", yes)? {
        println!("Aborted.");
        return Ok(());
    }

    let config = Config::load()?;
    let mut cache = open_cache(&config)?;
    cache.clear_entities()?;

    if !global.quiet {
        println!("{} Cache cleared", style("✓").green());
    }

    Ok(())
}

fn run_show(entity_type: Option<&str>, global: &GlobalOpts) -> Result<()> {
    let entity_type = parse_type(entity_type)?;
    let config = Config::load()?;
    let cache = open_cache(&config)?;
    let entries = cache.list(entity_type)?;

    if entries.is_empty() && matches!(global.format, OutputFormat::Auto | OutputFormat::Md) {
        if !global.quiet {
            println!(
                "Cache is empty. Run {} to populate it.",
                style("calm cache update").cyan()
            );
        }
        return Ok(());
    }

    print!("{}", render_entries(&entries, global.format)?);

    if global.format == OutputFormat::Auto && !global.quiet {
        println!("{} entr{} cached", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    }

    Ok(())
}

fn run_get(args: GetArgs, global: &GlobalOpts) -> Result<()> {
    let entity_type: EntityType = args.entity_type.parse()?;
    let filters: Vec<(&str, &str)> = args
        .attrs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let config = Config::load()?;
    let cache = open_cache(&config)?;

    let entry = match (&args.uuid, &args.name) {
        (Some(uuid), _) => cache
            .get_entity_data_using_uuid(entity_type, uuid, &filters)?
            .ok_or_else(|| CacheError::miss(entity_type, uuid.clone()))?,
        (None, Some(name)) => cache.require_entity_data(entity_type, name, &filters)?,
        (None, None) => return Err(miette::miette!("Provide an entity NAME or --uuid")),
    };

    print!("{}", render_entry(&entry, global.format)?);
    Ok(())
}

fn run_add(entity_type: &str, uuid: &str, global: &GlobalOpts) -> Result<()> {
    let entity_type: EntityType = entity_type.parse()?;
    let config = Config::load()?;
    let client = CalmClient::from_config(&config)?;
    let mut cache = open_cache(&config)?;

    let entry = cache.add_one(&client, entity_type, uuid)?;

    if !global.quiet {
        println!(
            "{} Cached {} '{}' ({})",
            style("✓").green(),
            entry.entity_type,
            style(&entry.name).cyan(),
            entry.uuid
        );
    }

    Ok(())
}

fn run_delete(entity_type: &str, uuid: &str, global: &GlobalOpts) -> Result<()> {
    let entity_type: EntityType = entity_type.parse()?;
    let config = Config::load()?;
    let mut cache = open_cache(&config)?;

    let removed = cache.delete_one(entity_type, uuid)?;

    if !global.quiet {
        if removed == 0 {
            println!("{} {} is not cached", entity_type, uuid);
        } else {
            println!("{} Removed {} {}", style("✓").green(), entity_type, uuid);
        }
    }

    Ok(())
}

fn run_status() -> Result<()> {
    let config = Config::load()?;
    let cache = open_cache(&config)?;
    let stats = cache.statistics()?;

    println!("{}", style("Cache Status").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Location:        {}", cache.path().display());
    println!("  Total entries:   {}", style(stats.total_entries).cyan());
    println!(
        "  Database size:   {} KB",
        style(stats.db_size_bytes / 1024).cyan()
    );

    println!();
    println!("  {}", style("By Type:").bold());
    for summary in &stats.by_type {
        let synced = summary
            .last_synced
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "    {:<18} {:>6}   {}",
            summary.entity_type.as_str(),
            summary.count,
            style(synced).dim()
        );
    }

    Ok(())
}

fn run_reset(yes: bool, global: &GlobalOpts) -> Result<()> {
    let config = Config::load()?;
    let cache_path = config.db_path()?;

    if !cache_path.exists() {
        println!("No cache to reset");
        return Ok(());
    }

    if !confirm(
        &format!("Delete {}?", cache_path.display()),
        "reset the cache",
        yes,
    )? {
        println!("Aborted.");
        return Ok(());
    }

    std::fs::remove_file(&cache_path)
        .map_err(|e| miette::miette!("Failed to remove cache: {}", e))?;

    // Also remove WAL and journal files if they exist
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut side_file = cache_path.clone().into_os_string();
        side_file.push(suffix);
        let _ = std::fs::remove_file(side_file);
    }

    if !global.quiet {
        println!("{} Cache database removed", style("✓").green());
    }

    Ok(())
}

/// Ask before a destructive action unless `--yes` was given
fn confirm(prompt: &str, action: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }

    if !console::Term::stderr().is_term() {
        return Err(miette::miette!(
            help = "Pass --yes to skip the confirmation",
            "Refusing to {} without confirmation in a non-interactive session",
            action
        ));
    }

    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

const HEADERS: [&str; 5] = ["TYPE", "NAME", "UUID", "ATTRIBUTES", "LAST UPDATED"];

/// Render a list of entries in the requested format
fn render_entries(entries: &[CacheEntry], format: OutputFormat) -> Result<String> {
    let output = match format {
        OutputFormat::Auto | OutputFormat::Md => {
            let mut builder = Builder::default();
            builder.push_record(HEADERS);
            for e in entries {
                builder.push_record([
                    e.entity_type.as_str().to_string(),
                    e.name.clone(),
                    e.uuid.clone(),
                    truncate_str(&e.attributes_display(), 48),
                    format_timestamp(&e.last_update_time),
                ]);
            }
            let mut table = builder.build();
            if format == OutputFormat::Md {
                table.with(Style::markdown());
            } else {
                table.with(Style::rounded());
            }
            format!("{}\n", table)
        }
        OutputFormat::Tsv => {
            let mut out = HEADERS.join("\t");
            out.push('\n');
            for e in entries {
                out.push_str(&format!(
                    "{}\t{}\t{}\t{}\t{}\n",
                    e.entity_type,
                    e.name,
                    e.uuid,
                    e.attributes_display(),
                    e.last_update_time.to_rfc3339()
                ));
            }
            out
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(HEADERS).into_diagnostic()?;
            for e in entries {
                writer
                    .write_record([
                        e.entity_type.as_str(),
                        e.name.as_str(),
                        e.uuid.as_str(),
                        e.attributes_display().as_str(),
                        e.last_update_time.to_rfc3339().as_str(),
                    ])
                    .into_diagnostic()?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|_| miette::miette!("Failed to flush CSV output"))?;
            String::from_utf8(bytes).into_diagnostic()?
        }
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(entries).into_diagnostic()?;
            out.push('\n');
            out
        }
        OutputFormat::Yaml => serde_yml::to_string(entries).into_diagnostic()?,
        OutputFormat::Id => entries
            .iter()
            .map(|e| format!("{}\n", e.uuid))
            .collect(),
    };

    Ok(output)
}

/// Render a single entry in the requested format
fn render_entry(entry: &CacheEntry, format: OutputFormat) -> Result<String> {
    let output = match format {
        OutputFormat::Auto => {
            let mut out = String::new();
            out.push_str(&format!("{:<14} {}\n", style("Type:").bold(), entry.entity_type));
            out.push_str(&format!("{:<14} {}\n", style("Name:").bold(), entry.name));
            out.push_str(&format!("{:<14} {}\n", style("UUID:").bold(), style(&entry.uuid).cyan()));
            for (key, value) in &entry.attributes {
                out.push_str(&format!("{:<14} {}\n", style(format!("{}:", key)).bold(), value));
            }
            out.push_str(&format!(
                "{:<14} {}\n",
                style("Updated:").bold(),
                format_timestamp(&entry.last_update_time)
            ));
            out
        }
        OutputFormat::Id => format!("{}\n", entry.uuid),
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(entry).into_diagnostic()?;
            out.push('\n');
            out
        }
        OutputFormat::Yaml => serde_yml::to_string(entry).into_diagnostic()?,
        _ => render_entries(std::slice::from_ref(entry), format)?,
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_entries() -> Vec<CacheEntry> {
        let mut cache = EntityCache::open_in_memory().unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert("cluster".to_string(), "clusterA".to_string());
        cache
            .create(EntityType::AhvSubnet, "vlan0", "subnet-a", &attrs)
            .unwrap();
        cache
            .create(EntityType::Account, "acc, one", "uuid-111", &BTreeMap::new())
            .unwrap();
        cache.list(None).unwrap()
    }

    #[test]
    fn test_render_tsv() {
        let output = render_entries(&sample_entries(), OutputFormat::Tsv).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TYPE\tNAME\tUUID"));
        assert!(lines[1].starts_with("ACCOUNT\tacc, one\tuuid-111"));
        assert!(lines[2].starts_with("AHV_SUBNET\tvlan0\tsubnet-a\tcluster=clusterA"));
    }

    #[test]
    fn test_render_csv_escapes_commas() {
        let output = render_entries(&sample_entries(), OutputFormat::Csv).unwrap();
        assert!(output.contains("ACCOUNT,\"acc, one\",uuid-111"));
    }

    #[test]
    fn test_render_json() {
        let output = render_entries(&sample_entries(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[1]["entity_type"], "AHV_SUBNET");
        assert_eq!(value[1]["attributes"]["cluster"], "clusterA");
    }

    #[test]
    fn test_render_ids() {
        let output = render_entries(&sample_entries(), OutputFormat::Id).unwrap();
        assert_eq!(output, "uuid-111\nsubnet-a\n");
    }

    #[test]
    fn test_render_markdown_table() {
        let output = render_entries(&sample_entries(), OutputFormat::Md).unwrap();
        assert!(output.contains("| TYPE"));
        assert!(output.contains("vlan0"));
    }

    #[test]
    fn test_render_single_entry_id() {
        let entries = sample_entries();
        let output = render_entry(&entries[1], OutputFormat::Id).unwrap();
        assert_eq!(output, "subnet-a\n");
    }
}
