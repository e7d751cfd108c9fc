use crate::config::{ConfigManager, SecretStoreKind};
use crate::error::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

/// Write a commented configuration template
pub fn init(args: InitArgs, manager: &ConfigManager) -> Result<()> {
    manager.init(args.force)?;
    println!(
        "{} Configuration template written to {}",
        "✓".green().bold(),
        manager.config_file().display().to_string().cyan()
    );
    println!("  Fill in the script, policy and secret store settings before running.");
    Ok(())
}

/// Print the effective configuration (secret names only, never values)
pub fn show(manager: &ConfigManager) -> Result<()> {
    let config = manager.load()?;

    println!(
        "{} {}",
        "Configuration:".cyan().bold(),
        manager.config_file().display()
    );

    println!("\n{}", "Graph".bold());
    println!("  Host: {}", config.graph.host);
    println!("  Authority: {}", config.graph.authority);
    println!("  Timeout: {}s", config.graph.timeout_secs);

    let store = &config.secret_store;
    println!("\n{}", "Secret store".bold());
    match store.kind {
        SecretStoreKind::KeyVault => {
            println!("  Kind: Key Vault (managed identity)");
            println!("  Vault: {}", store.vault_url.as_deref().unwrap_or("-"));
            if let Some(client_id) = &store.identity_client_id {
                println!("  Identity client ID: {}", client_id);
            }
        }
        SecretStoreKind::EnvFile => {
            println!("  Kind: .env file");
            println!(
                "  Path: {}",
                store
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".into())
            );
        }
    }
    println!(
        "  Secrets: {}, {}, {}",
        store.names.tenant_id, store.names.client_id, store.names.client_secret
    );

    println!("\n{}", "attribute-sync".bold());
    match &config.attribute_sync {
        Some(attr) => {
            println!("  Script: {}", attr.script_id);
            println!("  Desired result: {}", attr.desired_result);
            println!("  Attribute: {} = {}", attr.attribute_name(), attr.sentinel_value);
            println!("  Operating system: {}", attr.operating_system);
        }
        None => println!("  {}", "not configured".dimmed()),
    }

    println!("\n{}", "build-ranges".bold());
    match &config.build_ranges {
        Some(ranges) => {
            println!("  Policy: {}", ranges.policy_id);
            println!(
                "  Catalog: {} most recent {} update(s)",
                ranges.catalog_entry_count,
                ranges.classification.as_str()
            );
            println!("  Allow newer builds: {}", ranges.allow_newer_builds);
            for build in &ranges.builds {
                println!("  • {} ({})", build.prefix, build.description());
            }
            if ranges.expedite.enabled {
                println!(
                    "  Expedite: profile {}, reboot after {} day(s)",
                    ranges.expedite.policy_id, ranges.expedite.days_until_forced_reboot
                );
            } else {
                println!("  Expedite: {}", "disabled".dimmed());
            }
        }
        None => println!("  {}", "not configured".dimmed()),
    }

    Ok(())
}
