//! `fnlink resolve [fn-id]` — look up an appliance in the vendor directory.
//!
//! Prints the appliance's reachable endpoints and LAN IPv4 addresses.
//! Pure directory lookup; no control connection is opened.

use anyhow::Result;
use tracing::info;

use fnlink_client::discovery;

/// Resolve the appliance address record and print it.
pub async fn run(fn_id: &str) -> Result<()> {
    info!(%fn_id, "resolving appliance");
    let record = discovery::resolve_appliance(fn_id).await?;

    println!("{:<12} {}", "KIND", "ADDRESS");
    println!(
        "{:<12} {}",
        "\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}"
    );
    for endpoint in &record.endpoints {
        println!("{:<12} {}", "endpoint", endpoint);
    }
    for ip in &record.ipv4 {
        println!("{:<12} {}", "lan-ipv4", ip);
    }

    if record.endpoints.is_empty() && record.ipv4.is_empty() {
        println!("(directory returned no addresses)");
    }

    Ok(())
}
