mod output;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jtrace_core::TraceConsumer;
use jtrace_core::config::Config;
use jtrace_ingest::exporter::{ForwardConfig, LoggingConsumer, OtlpForwardConsumer};
use jtrace_ingest::jaeger::thrift;
use jtrace_ingest::translate::translate_batch;
use jtrace_ingest::{JaegerReceiver, ReceiverConfig};

use crate::output::{StdoutConsumer, render_human, render_json};
use crate::telemetry::{TelemetryConfig, init_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "jtrace")]
#[command(about = "Jaeger-compatible trace receiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run the Jaeger HTTP and gRPC collector endpoints")]
    Run {
        #[arg(long)]
        http_addr: Option<String>,
        #[arg(long)]
        grpc_addr: Option<String>,
        #[arg(long, help = "Disable the HTTP/Thrift endpoint")]
        no_http: bool,
        #[arg(long, help = "Disable the gRPC endpoint")]
        no_grpc: bool,
        #[arg(long, help = "logging, stdout or otlp")]
        exporter: Option<String>,
        #[arg(long)]
        forward_endpoint: Option<String>,
        #[arg(long, help = "Log every span with the logging exporter")]
        verbose: bool,
    },
    #[command(about = "Translate a Jaeger Thrift batch file and print it")]
    Decode { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            http_addr,
            grpc_addr,
            no_http,
            no_grpc,
            exporter,
            forward_endpoint,
            verbose,
        } => {
            let mut cfg = Config::load().context("load config")?;
            if let Some(v) = http_addr {
                cfg.collector_http_addr = v;
            }
            if let Some(v) = grpc_addr {
                cfg.collector_grpc_addr = v;
            }
            if no_http {
                cfg.http_enabled = false;
            }
            if no_grpc {
                cfg.grpc_enabled = false;
            }
            if let Some(v) = exporter {
                cfg.exporter = v;
            }
            if let Some(v) = forward_endpoint {
                cfg.forward_otlp_endpoint = Some(v);
            }
            run_server(cfg, cli.json, verbose).await
        }
        Commands::Decode { path } => {
            init_tracing(&TelemetryConfig::cli());
            decode_file(&path, cli.json)
        }
    }
}

async fn run_server(cfg: Config, json: bool, verbose: bool) -> anyhow::Result<()> {
    init_tracing(&TelemetryConfig::run());

    let consumer = build_consumer(&cfg, json, verbose)?;
    let receiver_cfg = ReceiverConfig::from_config(&cfg).context("receiver config")?;
    let receiver = JaegerReceiver::start(receiver_cfg, consumer)
        .await
        .context("start receiver")?;

    eprintln!("jtrace run");
    eprintln!("  exporter: {}", cfg.exporter);
    match receiver.http_addr() {
        Some(addr) => eprintln!("  collector http: http://{addr}/api/traces"),
        None => eprintln!("  collector http: disabled"),
    }
    match receiver.grpc_addr() {
        Some(addr) => eprintln!("  collector grpc: {addr}"),
        None => eprintln!("  collector grpc: disabled"),
    }

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("received ctrl-c, shutting down");

    let stopped = receiver.stop().await;
    shutdown_tracing();
    stopped.context("stop receiver")
}

fn build_consumer(
    cfg: &Config,
    json: bool,
    verbose: bool,
) -> anyhow::Result<Arc<dyn TraceConsumer>> {
    let consumer: Arc<dyn TraceConsumer> = match cfg.exporter.to_ascii_lowercase().as_str() {
        "logging" => Arc::new(LoggingConsumer::new(verbose)),
        "stdout" => Arc::new(StdoutConsumer::new(json)),
        "otlp" => {
            let forward = ForwardConfig::from_config(cfg)?;
            tracing::info!(
                endpoint = %forward.endpoint,
                protocol = ?forward.protocol,
                "forwarding spans as otlp"
            );
            Arc::new(OtlpForwardConsumer::new(forward)?)
        }
        other => anyhow::bail!("unknown exporter: {other} (expected logging, stdout or otlp)"),
    };
    Ok(consumer)
}

fn decode_file(path: &Path, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let batch = thrift::decode_batch(&bytes)
        .with_context(|| format!("decode thrift batch from {}", path.display()))?;
    let outcome = translate_batch(&batch).context("translate batch")?;
    for rejection in &outcome.rejected {
        tracing::warn!(index = rejection.index, error = %rejection.error, "span rejected");
    }

    if json {
        println!("{}", render_json(&outcome.trace_data)?);
    } else {
        println!("{}", render_human(&outcome.trace_data, false));
        if !outcome.rejected.is_empty() {
            println!("-- {} spans rejected --", outcome.rejected.len());
        }
    }
    Ok(())
}
