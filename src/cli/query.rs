// ABOUTME: CLI vector and report commands against a single server
//
// vector: fetch a group's version vector and show its size and call record
// report: produce a replication report, optionally saving the raw payload

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use super::util::{deadline, resolve_group};
use super::{OutputFormat, ReportArgs, VectorArgs};
use crate::client::Client;
use crate::config::AppConfig;
use crate::session::{Call, ReportRequest, ServerName};
use crate::transport::BridgeConnector;

/// JSON output structure for the vector command
#[derive(Debug, Serialize)]
pub struct VectorOutput {
    pub server: ServerName,
    pub group: String,
    pub group_id: String,
    pub size: usize,
    pub call: Call,
}

/// JSON output structure for the report command
#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub server: ServerName,
    pub group: String,
    pub group_id: String,
    pub data_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<String>,
    pub text: String,
    pub call: Call,
}

fn client_for(config: &AppConfig) -> Client {
    let connector = Arc::new(BridgeConnector::new(config.bridge.clone()));
    Client::new(connector, config.client.clone())
}

/// Execute the vector command
pub async fn vector(args: VectorArgs, format: OutputFormat, config: &AppConfig) -> Result<()> {
    let (group, id) = resolve_group(config, &args.group)?;
    let client = client_for(config);

    let deadline = deadline(args.timeout.as_timeout());
    let traced = client.vector(&deadline.token, &args.server, id).await;
    client.close().await;

    let vector = traced
        .result
        .with_context(|| format!("Failed to fetch vector for {group} from {}", args.server))?;

    let output = VectorOutput {
        server: ServerName::new(&args.server),
        group,
        group_id: id.to_string(),
        size: vector.as_bytes().len(),
        call: traced.call,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!(
                "Vector for {} ({}) on {}: {} bytes",
                output.group, output.group_id, output.server, output.size
            );
            println!("Call: {}", output.call);
        }
    }
    Ok(())
}

/// Execute the report command
pub async fn report(args: ReportArgs, format: OutputFormat, config: &AppConfig) -> Result<()> {
    let (group, id) = resolve_group(config, &args.group)?;
    let client = client_for(config);

    let request = ReportRequest {
        group: id,
        vector: None,
        backlog: args.backlog,
        files: args.files,
    };
    let deadline = deadline(args.timeout.as_timeout());
    let traced = client.report(&deadline.token, &args.server, &request).await;
    client.close().await;

    let report = traced
        .result
        .with_context(|| format!("Failed to produce report for {group} from {}", args.server))?;

    if let Some(path) = &args.output {
        save_payload(path, &report.data)?;
    }

    let output = ReportOutput {
        server: ServerName::new(&args.server),
        group,
        group_id: id.to_string(),
        data_size: report.data.len(),
        saved_to: args.output.as_ref().map(|p| p.display().to_string()),
        text: report.text,
        call: traced.call,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("{}", output.text);
            if let Some(path) = &output.saved_to {
                println!("Report data ({} bytes) written to {path}", output.data_size);
            }
            println!("Call: {}", output.call);
        }
    }
    Ok(())
}

fn save_payload(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write report data to {}", path.display()))
}
