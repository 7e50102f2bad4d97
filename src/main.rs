use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use port_scan_rs::config::{ScanLimits, DEFAULT_TIMEOUT_SECS};
use port_scan_rs::engine::PortScanEngine;
use port_scan_rs::ports::load_ports_from_path;
use port_scan_rs::probe::NetworkProber;
use port_scan_rs::server;
use port_scan_rs::store::InstanceStore;
use port_scan_rs::types::{Protocol, ScanReport, ScanRequest};

/// port-scan-rs — bounded, concurrent TCP/UDP port scanner with a JSON HTTP API.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-scan-rs",
    version,
    about = "Bounded, concurrent TCP/UDP port scanner with a JSON HTTP API.",
    long_about = None
)]
struct Cli {
    /// Host name or IP address to scan once and print.
    #[arg(long)]
    target: Option<String>,

    /// Port spec, e.g. `22,80,443` or `1-1024,8080`. Defaults to a small common set.
    #[arg(long, conflicts_with = "ports_file")]
    ports: Option<String>,

    /// Path to a ports file (comma lists per line, `#` comments).
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Transport to probe with.
    #[arg(long, default_value = "tcp")]
    protocol: Protocol,

    /// Per-port timeout in seconds (connect and banner read).
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS as i64)]
    timeout: i64,

    /// Max concurrent probes (capped at 50).
    #[arg(long, default_value_t = 50)]
    concurrency: usize,

    /// Write the report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the HTTP API server.
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Address the HTTP API binds to.
    #[arg(long, env = "PORT_SCAN_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if cli.target.is_none() && !cli.serve {
        bail!("nothing to do: pass --target to scan once or --serve to start the HTTP API");
    }

    let limits = ScanLimits::default().with_concurrency(cli.concurrency);
    let engine = Arc::new(PortScanEngine::new(
        Arc::new(NetworkProber),
        InstanceStore::new(),
        limits,
    ));

    // Start the API server if requested (non-blocking background task)
    if cli.serve {
        let bind = cli.bind.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, engine).await {
                error!("HTTP API server error: {e:#}");
            }
        });
        println!("API server starting at http://{} (Ctrl+C to stop)", cli.bind);
    }

    if let Some(target) = cli.target.as_deref() {
        let ports = match cli.ports_file.as_deref() {
            Some(path) => Some(
                load_ports_from_path(path)?
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            None => cli.ports.clone(),
        };
        let req = ScanRequest {
            target: target.to_string(),
            ports,
            protocol: Some(cli.protocol.to_string()),
            timeout: Some(cli.timeout),
        };

        // Ctrl-C cancels the scan.
        let cancel = CancellationToken::new();
        let cancel_ctrlc = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel_ctrlc.cancel();
        });

        let report = engine
            .scan_with_cancel(&req, cancel)
            .await
            .with_context(|| format!("scan of {target} failed"))?;
        print_results_table(&report);
        if let Some(path) = cli.output.as_deref() {
            write_report_json(path, &report)
                .with_context(|| format!("failed to write JSON to {}", path.display()))?;
            println!("Wrote JSON report to {}", path.display());
        }
    }

    // If the API is running, keep the process alive until Ctrl+C.
    if cli.serve {
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    }

    Ok(())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {e}");
    }
}

fn print_results_table(report: &ScanReport) {
    let status_w = "filtered".len();
    let mut service_w = "service".len();
    let mut banner_w = "banner".len();
    for r in &report.results {
        service_w = service_w.max(r.service.len());
        banner_w = banner_w.max(r.banner.chars().count().min(60));
    }
    let port_w = 5usize;
    let dur_w = "duration_ms".len();

    println!(
        "\n{} ({}): {} open of {} scanned",
        report.target, report.protocol, report.open_ports, report.total_ports
    );
    println!(
        "{:>port_w$}  {:<status_w$}  {:<service_w$}  {:>dur_w$}  {:<banner_w$}",
        "port", "status", "service", "duration_ms", "banner",
    );
    println!(
        "{:-<port_w$}  {:-<status_w$}  {:-<service_w$}  {:-<dur_w$}  {:-<banner_w$}",
        "", "", "", "", "",
    );
    for r in &report.results {
        let bsnip: String = r
            .banner
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .take(60)
            .collect();
        println!(
            "{:>port_w$}  {:<status_w$}  {:<service_w$}  {:>dur_w$}  {:<banner_w$}",
            r.port, r.status, r.service, r.duration_ms, bsnip,
        );
    }
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
