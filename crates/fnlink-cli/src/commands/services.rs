//! `fnlink services` — list the applications hosted on the appliance.
//!
//! Resolves the appliance, logs in over the control channel, and prints one
//! row per application. The default view shows externally routable URLs and
//! the entry token needed to open them; `--local` shows LAN URLs instead.

use anyhow::{Context, Result};
use tracing::info;

use fnlink_client::{discovery, ConnectOptions, NasClient};
use fnlink_core::ServiceDescriptor;

use crate::config::Credentials;

/// List hosted applications with their URLs.
pub async fn run(creds: &Credentials, local: bool) -> Result<()> {
    info!(fn_id = %creds.fn_id, "resolving appliance");
    let record = discovery::resolve_appliance(&creds.fn_id).await?;
    let host = record
        .primary_host()
        .context("directory record carries no reachable endpoint")?
        .to_string();

    let mut client = NasClient::connect(&host, ConnectOptions::for_host(&host)).await?;
    let outcome = query(&mut client, creds, local).await;
    client.close().await;
    let (apps, entry_token) = outcome?;

    if apps.is_empty() {
        println!("No applications hosted on {host}.");
        return Ok(());
    }

    println!("{:<20} {:<8} {}", "TITLE", "PORT", "URL");
    println!(
        "{:<20} {:<8} {}",
        "\u{2500}\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}\u{2500}",
        "\u{2500}\u{2500}\u{2500}"
    );

    let mut shown = 0usize;
    for app in &apps {
        let url = if local {
            let ip = record.local_ip().unwrap_or(&host);
            app.local_url(ip)
        } else {
            app.external_url(&host)
        };
        let Some(url) = url else { continue };
        let port = app
            .port()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        println!("{:<20} {:<8} {}", app.display_title(), port, url);
        shown += 1;
    }

    println!("\n{shown} of {} application(s) routable.", apps.len());
    if let Some(token) = entry_token {
        println!("entry token: {token}");
    }

    Ok(())
}

async fn query(
    client: &mut NasClient,
    creds: &Credentials,
    local: bool,
) -> Result<(Vec<ServiceDescriptor>, Option<String>)> {
    client.login(&creds.username, &creds.password).await?;

    let apps = client.list_applications(true).await?;
    // The entry token only matters for externally routed URLs.
    let entry_token = if local {
        None
    } else {
        Some(client.exchange_entry_token().await?)
    };
    Ok((apps, entry_token))
}
