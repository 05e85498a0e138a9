//! reader-ctl: drive a running accessible-reader over its control API.
//!
//! Usage: reader-ctl <status|play|pause|toggle|stop|next|prev>
//!        reader-ctl set <setting> <value>
//!        reader-ctl lang <tag>

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "reader-ctl", about = "Control a running accessible-reader")]
struct Args {
    /// Control API base URL
    #[arg(long, default_value = "http://127.0.0.1:8791")]
    api: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show reader state
    Status,
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    /// Change a reader setting (fontSize, lineHeight, theme, font, rate, mode)
    Set { setting: String, value: String },
    /// Change the content language
    Lang { language: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let base = args.api.trim_end_matches('/');

    // Short timeouts: the reader is local or not running at all
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| Client::new());

    let request = match &args.command {
        Cmd::Status => client.get(format!("{base}/status")),
        Cmd::Play => client.post(format!("{base}/play")),
        Cmd::Pause => client.post(format!("{base}/pause")),
        Cmd::Toggle => client.post(format!("{base}/toggle")),
        Cmd::Stop => client.post(format!("{base}/stop")),
        Cmd::Next => client.post(format!("{base}/next")),
        Cmd::Prev => client.post(format!("{base}/prev")),
        Cmd::Set { setting, value } => client
            .post(format!("{base}/settings"))
            .json(&json!({ "setting": setting, "value": value })),
        Cmd::Lang { language } => client
            .post(format!("{base}/language"))
            .json(&json!({ "language": language })),
    };

    let resp = match request.send().await {
        Ok(resp) => resp,
        Err(e) => {
            eprintln!("Reader not reachable at {base}: {e}");
            std::process::exit(2);
        }
    };

    let body: Value = resp.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if body.get("status").and_then(Value::as_str) == Some("error") {
        std::process::exit(1);
    }
    Ok(())
}
