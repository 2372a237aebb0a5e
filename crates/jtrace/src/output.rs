use std::io::IsTerminal;

use async_trait::async_trait;
use chrono::SecondsFormat;
use jtrace_core::model::{Span, TraceData};
use jtrace_core::{ConsumerError, TraceConsumer};
use owo_colors::OwoColorize;

/// Prints each delivered batch to stdout, one JSON line or a human block per batch.
pub struct StdoutConsumer {
    json: bool,
    color: bool,
}

impl StdoutConsumer {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            color: std::io::stdout().is_terminal(),
        }
    }
}

#[async_trait]
impl TraceConsumer for StdoutConsumer {
    async fn consume(&self, data: TraceData) -> Result<usize, ConsumerError> {
        let rendered = if self.json {
            render_json(&data)
                .map_err(|e| ConsumerError::Rejected(format!("failed to render batch: {e}")))?
        } else {
            render_human(&data, self.color)
        };
        println!("{rendered}");
        Ok(data.span_count())
    }
}

pub fn render_json(data: &TraceData) -> serde_json::Result<String> {
    serde_json::to_string(data)
}

pub fn render_human(data: &TraceData, color: bool) -> String {
    let service = &data.process.service_name;
    let mut out = format!(
        "BATCH service={} format={} spans={}",
        if color {
            service.cyan().to_string()
        } else {
            service.clone()
        },
        data.source_format,
        data.spans.len()
    );
    if !data.process.attributes.is_empty() {
        out.push_str(&format!(
            "\n  process {}",
            render_attributes(&data.process.attributes)
        ));
    }
    for span in &data.spans {
        out.push('\n');
        out.push_str(&render_span(span, color));
    }
    out
}

fn render_span(span: &Span, color: bool) -> String {
    let status = if span.status.is_ok() {
        let label = span.status.code.name();
        if color {
            label.green().to_string()
        } else {
            label.to_string()
        }
    } else {
        let label = format!("{} {:?}", span.status.code.name(), span.status.message);
        if color {
            label.red().to_string()
        } else {
            label
        }
    };
    let parent = span
        .parent_span_id
        .map(|p| p.to_hex())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "  {} trace={} span={} parent={} start={} duration={}ms status={}",
        span.name,
        span.trace_id,
        span.span_id,
        parent,
        span.start_time.to_rfc3339_opts(SecondsFormat::Micros, true),
        span.duration().num_milliseconds(),
        status
    );
    if !span.attributes.is_empty() {
        line.push_str(&format!(" attrs={}", render_attributes(&span.attributes)));
    }
    if !span.events.is_empty() {
        line.push_str(&format!(" events={}", span.events.len()));
    }
    line
}

fn render_attributes(attributes: &jtrace_core::model::Attributes) -> String {
    attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}
