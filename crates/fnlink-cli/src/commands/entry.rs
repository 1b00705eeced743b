//! `fnlink entry --port <p>` — resolve the external entry for one application.
//!
//! Logs in, exchanges an entry token, and selects the application bound to
//! the requested port. An unknown port is reported as not found, never a
//! crash; when several applications share the port, the first in list order
//! wins.

use anyhow::{bail, Context, Result};
use tracing::info;

use fnlink_client::{discovery, ConnectOptions, NasClient};
use fnlink_core::{find_by_port, ServiceDescriptor};

use crate::config::Credentials;

/// Print the external URL and entry token for the application on `port`.
pub async fn run(creds: &Credentials, port: u64) -> Result<()> {
    info!(fn_id = %creds.fn_id, port, "resolving application entry");
    let record = discovery::resolve_appliance(&creds.fn_id).await?;
    let host = record
        .primary_host()
        .context("directory record carries no reachable endpoint")?
        .to_string();

    let mut client = NasClient::connect(&host, ConnectOptions::for_host(&host)).await?;
    let outcome = query(&mut client, creds).await;
    client.close().await;
    let (entry_token, apps) = outcome?;

    let Some(app) = find_by_port(&apps, port) else {
        bail!("no application found on port {port}");
    };
    let Some(url) = app.external_url(&host) else {
        bail!(
            "application '{}' on port {port} has no external routing domain",
            app.display_title()
        );
    };

    println!("{:<12} {}", "title", app.display_title());
    println!("{:<12} {}", "url", url);
    println!("{:<12} {}", "entry token", entry_token);

    Ok(())
}

async fn query(
    client: &mut NasClient,
    creds: &Credentials,
) -> Result<(String, Vec<ServiceDescriptor>)> {
    client.login(&creds.username, &creds.password).await?;
    let entry_token = client.exchange_entry_token().await?;
    let apps = client.list_applications(true).await?;
    Ok((entry_token, apps))
}
