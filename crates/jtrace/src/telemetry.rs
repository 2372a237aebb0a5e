use std::io::IsTerminal;
use std::sync::{Mutex, OnceLock};

use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace as sdktrace;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_NAME: &str = "jtrace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("JTRACE_LOG_FORMAT").unwrap_or_default())
    }

    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }
}

/// How a subcommand's own diagnostics are emitted. Everything goes to stderr;
/// stdout belongs to the stdout exporter and `decode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset or unparsable.
    pub default_directive: &'static str,
    pub self_export: bool,
}

impl TelemetryConfig {
    pub fn cli() -> Self {
        Self {
            format: LogFormat::Compact,
            default_directive: "warn",
            self_export: false,
        }
    }

    /// `JTRACE_LOG_FORMAT` picks the layout, `OTEL_EXPORTER_OTLP_ENDPOINT`
    /// turns on export of jtrace's own spans.
    pub fn run() -> Self {
        Self {
            format: LogFormat::from_env(),
            default_directive: "info",
            self_export: std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive))
    }
}

pub fn init_tracing(cfg: &TelemetryConfig) {
    let ansi = std::io::stderr().is_terminal();
    let compact = (cfg.format == LogFormat::Compact).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(ansi)
            .compact()
    });
    let json = (cfg.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_writer(std::io::stderr)
    });
    let otlp = cfg.self_export.then(build_otlp_layer).flatten();

    let _ = tracing_subscriber::registry()
        .with(cfg.filter())
        .with(compact)
        .with(json)
        .with(otlp)
        .try_init();
}

/// Flushes self-exported spans.
pub fn shutdown_tracing() {
    let Some(provider) = otlp_provider_slot()
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
    else {
        return;
    };
    if let Err(err) = provider.shutdown() {
        eprintln!("jtrace: otlp self-export shutdown failed: {err}");
    }
}

fn build_otlp_layer<S>() -> Option<OpenTelemetryLayer<S, sdktrace::Tracer>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("jtrace: otlp self-export disabled: {err}");
            return None;
        }
    };

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .with_batch_exporter(exporter)
        .build();
    let tracer = provider.tracer(SERVICE_NAME);

    if let Ok(mut slot) = otlp_provider_slot().lock() {
        *slot = Some(provider);
    }

    Some(tracing_opentelemetry::layer().with_tracer(tracer))
}

fn otlp_provider_slot() -> &'static Mutex<Option<sdktrace::SdkTracerProvider>> {
    static SLOT: OnceLock<Mutex<Option<sdktrace::SdkTracerProvider>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}
