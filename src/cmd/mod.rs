pub mod attribute_sync;
pub mod build_ranges;
pub mod config;

use crate::config::Config;
use crate::error::Result;
use crate::graph::auth::ClientCredentialsAuth;
use crate::graph::GraphClient;
use crate::reconcile::RunReport;
use crate::secrets;
use colored::Colorize;

/// Safely truncate a string to n characters (not bytes) to prevent panics on non-ASCII
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Secret store → credentials → token → Graph client
pub async fn connect(config: &Config) -> Result<GraphClient> {
    println!("{} to Microsoft Graph...", "Connecting".cyan().bold());

    let store = secrets::from_config(&config.secret_store)?;
    let credentials =
        secrets::load_credentials(store.as_ref(), &config.secret_store.names).await?;

    println!(
        "→ Tenant: {}...  Client: {}...",
        truncate_chars(&credentials.tenant_id, 8).cyan(),
        truncate_chars(&credentials.client_id, 8).cyan()
    );

    let auth = ClientCredentialsAuth::new(&config.graph);
    let graph = GraphClient::authenticate(&config.graph, &credentials, &auth).await?;

    println!("{} Authenticated", "✓".green());
    Ok(graph)
}

pub fn print_report(report: &RunReport, dry_run: bool) {
    println!();
    if dry_run {
        println!(
            "{} DRY RUN - {} change(s) would be written",
            "ℹ".yellow().bold(),
            report.planned
        );
    } else {
        println!("{} {} change(s) written", "✓".green().bold(), report.writes);
    }

    if !report.is_clean() {
        println!(
            "{} {} item(s) failed:",
            "✗".red().bold(),
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  {} {}: {}", "✗".red(), failure.target, failure.reason);
        }
    }
}
