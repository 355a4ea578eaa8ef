use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use linewire_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'static str,
    size: usize,
    payload: String,
    channel: &'a str,
    timestamp: u64,
}

impl<'a> MessageOutput<'a> {
    fn new(message: &Message, channel: &'a str) -> Self {
        Self {
            kind: message.kind().name(),
            size: payload_size(message),
            payload: preview(message),
            channel,
            timestamp: now_unix_seconds(),
        }
    }
}

/// Print one received message to stdout.
pub fn print_message(message: &Message, channel: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", render_json(message, channel)),
        OutputFormat::Table => {
            let out = MessageOutput::new(message, channel);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "SIZE", "CHANNEL", "PAYLOAD"])
                .add_row(vec![
                    out.kind.to_string(),
                    out.size.to_string(),
                    out.channel.to_string(),
                    out.payload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} size={} channel={} payload={}",
                message.kind(),
                payload_size(message),
                channel,
                preview(message)
            );
        }
        OutputFormat::Raw => print_raw(message),
    }
}

fn render_json(message: &Message, channel: &str) -> String {
    serde_json::to_string(&MessageOutput::new(message, channel))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Write the payload bytes as-is, one message per line.
fn print_raw(message: &Message) {
    let mut out = std::io::stdout().lock();
    let bytes: &[u8] = match message {
        Message::Text(text) | Message::Error(text) => text.as_bytes(),
        Message::Binary(payload) => payload.as_ref(),
    };
    let _ = out.write_all(bytes);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn payload_size(message: &Message) -> usize {
    match message {
        Message::Text(text) | Message::Error(text) => text.chars().count(),
        Message::Binary(payload) => payload.len(),
    }
}

fn preview(message: &Message) -> String {
    match message {
        Message::Text(text) | Message::Error(text) => text.clone(),
        Message::Binary(payload) => match std::str::from_utf8(payload) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<binary {} bytes>", payload.len()),
        },
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
