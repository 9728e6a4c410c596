// ABOUTME: CLI backlog command - sweep backlog across the selected topology
//
// Each sweep computes every selected connection's backlog concurrently and
// prints a table (or JSON) with per-connection timing and the total time.
// A finite loop count runs sweeps back to back with a delay; "infinite" hands
// the sweep to a Poller and runs until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Serialize, Serializer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::util::{deadline, Repeat};
use super::{BacklogArgs, OutputFormat};
use crate::client::{Client, ClientConfig};
use crate::config::{AppConfig, Connection, Filters};
use crate::poller::{PollSource, Poller};
use crate::session::{Call, ServerName, Traced};
use crate::transport::BridgeConnector;

/// Backlog of one replicated folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderBacklog {
    pub folder: String,
    pub backlog: u64,
}

/// Outcome for one (group, source, destination) connection
#[derive(Debug, Clone, Serialize)]
pub struct BacklogRow {
    pub group: String,
    pub from: ServerName,
    pub to: ServerName,
    /// Total backlog across folders, absent on error
    pub backlog: Option<u64>,
    /// Per-folder breakdown when the server reported one value per folder
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<FolderBacklog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "millis")]
    pub elapsed: Duration,
    /// Call record, kept only in verbose mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<Call>,
}

impl BacklogRow {
    fn new(connection: &Connection, traced: Traced<Vec<u64>>, verbose: bool) -> Self {
        let elapsed = traced.call.duration();
        let call = verbose.then_some(traced.call);

        let (backlog, folders, error) = match traced.result {
            Ok(values) => {
                let folders = if values.len() == connection.folders.len() {
                    connection
                        .folders
                        .iter()
                        .zip(&values)
                        .map(|(folder, backlog)| FolderBacklog {
                            folder: folder.clone(),
                            backlog: *backlog,
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                (Some(values.iter().sum()), folders, None)
            }
            Err(e) => (None, Vec::new(), Some(e.to_string())),
        };

        Self {
            group: connection.group.clone(),
            from: connection.from.clone(),
            to: connection.to.clone(),
            backlog,
            folders,
            error,
            elapsed,
            call,
        }
    }
}

/// All rows of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct Sweep {
    pub rows: Vec<BacklogRow>,
    #[serde(rename = "total_ms", serialize_with = "millis")]
    pub total: Duration,
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Compute the backlog of every connection concurrently
pub async fn sweep(
    client: &Client,
    connections: &[Connection],
    cancel: &CancellationToken,
    verbose: bool,
) -> Sweep {
    let start = Instant::now();
    let results = join_all(connections.iter().map(|c| {
        client.backlog(cancel, c.from.as_str(), c.to.as_str(), c.group_id)
    }))
    .await;
    let total = start.elapsed();

    let rows = connections
        .iter()
        .zip(results)
        .map(|(connection, traced)| BacklogRow::new(connection, traced, verbose))
        .collect();
    Sweep { rows, total }
}

/// Render a sweep as a text table
///
/// Rows whose backlog is below `min` are hidden; failed rows count as zero.
pub fn render_text(sweep: &Sweep, min: u64, verbose: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<30} {:<40} {:<40} {:<15} {}\n",
        "Group", "Source", "Destination", "Backlog", "Time"
    ));
    out.push_str(&format!(
        "{:<30} {:<40} {:<40} {:<15} {}\n",
        "-----", "------", "-----------", "-------", "----"
    ));

    for row in &sweep.rows {
        if row.backlog.unwrap_or(0) < min {
            continue;
        }
        let backlog = match (&row.error, row.backlog) {
            (Some(error), _) => error.clone(),
            (None, Some(backlog)) => backlog.to_string(),
            (None, None) => String::new(),
        };
        out.push_str(&format!(
            "{:<30} {:<40} {:<40} {:<15} {:?}\n",
            row.group,
            row.from.as_str(),
            row.to.as_str(),
            backlog,
            row.elapsed
        ));
        if verbose {
            if let Some(call) = &row.call {
                out.push_str(&format!("Call: {call}\n"));
            }
        }
    }

    out.push_str(&format!("Total Time: {:?}\n", sweep.total));
    out
}

/// Compile the regex filters from the command line
pub fn build_filters(args: &BacklogArgs) -> Result<Filters> {
    Ok(Filters {
        groups: Filters::compile(&args.groups).context("Invalid group filter")?,
        from: Filters::compile(&args.from).context("Invalid source filter")?,
        to: Filters::compile(&args.to).context("Invalid destination filter")?,
        member: Filters::compile(&args.member).context("Invalid member filter")?,
        skip: Filters::compile(&args.skip).context("Invalid skip filter")?,
    })
}

/// How sweeps are bounded and displayed
#[derive(Debug, Clone, Copy)]
struct Printer {
    format: OutputFormat,
    min: u64,
    verbose: bool,
    timeout: Option<Duration>,
}

impl Printer {
    async fn run(&self, client: &Client, connections: &[Connection]) -> Sweep {
        let deadline = deadline(self.timeout);
        sweep(client, connections, &deadline.token, self.verbose).await
    }

    fn print(&self, sweep: &Sweep) -> Result<()> {
        match self.format {
            OutputFormat::Text => print!("{}", render_text(sweep, self.min, self.verbose)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(sweep)?),
        }
        Ok(())
    }
}

/// Sweeps driven by the poller in infinite mode
struct SweepSource {
    client: Arc<Client>,
    connections: Vec<Connection>,
    printer: Printer,
}

#[async_trait]
impl PollSource for SweepSource {
    async fn poll(&self, cancel: CancellationToken) {
        let sweep = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            sweep = self.printer.run(&self.client, &self.connections) => sweep,
        };
        if let Err(e) = self.printer.print(&sweep) {
            warn!(error = %e, "Failed to print sweep");
        }
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

/// Execute the backlog command
pub async fn execute(args: BacklogArgs, format: OutputFormat, config: &AppConfig) -> Result<()> {
    if args.loops == Repeat::Times(0) {
        return Ok(());
    }

    let filters = build_filters(&args)?;
    let connections = config.topology().connections(&filters);
    if connections.is_empty() {
        println!("No connections match the given filters.");
        return Ok(());
    }
    info!(connections = connections.len(), loops = %args.loops, "Starting backlog sweep");

    let client_config = ClientConfig {
        cache_duration: Duration::from_secs(args.cache),
        ..config.client.clone()
    };
    let connector = Arc::new(BridgeConnector::new(config.bridge.clone()));
    let client = Arc::new(Client::new(connector, client_config));
    let printer = Printer {
        format,
        min: args.min,
        verbose: args.verbose,
        timeout: args.timeout.as_timeout(),
    };
    let delay = Duration::from_secs(args.delay);

    match args.loops {
        Repeat::Times(loops) => {
            let result = run_loops(&client, &connections, printer, loops, delay).await;
            client.close().await;
            result
        }
        Repeat::Infinite => run_forever(client, connections, printer, delay).await,
    }
}

async fn run_loops(
    client: &Client,
    connections: &[Connection],
    printer: Printer,
    loops: u64,
    delay: Duration,
) -> Result<()> {
    for iteration in 0..loops {
        let sweep = printer.run(client, connections).await;
        printer.print(&sweep)?;

        if iteration + 1 < loops {
            if printer.format == OutputFormat::Text {
                println!();
            }
            tokio::time::sleep(delay).await;
        }
    }
    Ok(())
}

async fn run_forever(
    client: Arc<Client>,
    connections: Vec<Connection>,
    printer: Printer,
    delay: Duration,
) -> Result<()> {
    // The poller needs a non-zero period
    let interval = delay.max(Duration::from_secs(1));
    let source = SweepSource {
        client,
        connections,
        printer,
    };
    let poller = Poller::start(source, interval);
    poller.poll();

    let interrupted = tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C");
    info!("Stopping backlog sweeps");
    poller.close().await;
    interrupted
}
