use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use simlink_client::SimMessage;

/// Longest string field shown before it is summarized.
const PREVIEW_LIMIT: usize = 64;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
    msg_type: Option<&'a str>,
    peer: &'a str,
    message: Value,
    timestamp: String,
}

pub fn print_message(message: &SimMessage, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                msg_type: message.msg_type(),
                peer,
                message: message.to_value(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "PEER", "FIELDS"])
                .add_row(vec![
                    message.msg_type().unwrap_or("-").to_string(),
                    peer.to_string(),
                    field_summary(&message.to_value()).join("\n"),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "msg_type={} peer={} {}",
                message.msg_type().unwrap_or("-"),
                peer,
                field_summary(&message.to_value()).join(" ")
            );
        }
    }
}

/// `key=value` pairs for every field except `msg_type`. Long strings such as
/// camera frames are reduced to their length.
fn field_summary(value: &Value) -> Vec<String> {
    let Value::Object(map) = value else {
        return vec![value.to_string()];
    };

    map.iter()
        .filter(|(key, _)| key.as_str() != "msg_type")
        .map(|(key, value)| match value {
            Value::String(text) if text.len() > PREVIEW_LIMIT => {
                format!("{key}=<{} chars>", text.len())
            }
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect()
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
