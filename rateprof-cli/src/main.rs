//! rateprof-cli: terminal client for the rateprof chat endpoint
//!
//! # Subcommands
//! - `ask <question>`: one-shot question, reply streamed to stdout
//! - `chat`: interactive session; history lives only in memory
//! - `status`: show server health

use std::io::{self, BufRead, Read, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "rateprof-cli",
    version,
    about = "Ask the rateprof assistant for professor recommendations"
)]
struct Cli {
    /// Rateprof server URL (overrides RATEPROF_URL env var)
    #[arg(long, env = "RATEPROF_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// What you are looking for in a professor
        question: String,
    },

    /// Start an interactive conversation (type `exit` to quit)
    Chat,

    /// Show rateprof server status
    Status,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: Option<String>,
}

/// Render a non-success response body for the terminal.
pub fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) => match e.stage {
            Some(stage) => format!("server returned {} ({} stage): {}", status, stage, e.error),
            None => format!("server returned {}: {}", status, e.error),
        },
        Err(_) => format!("server returned {}: {}", status, body),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

/// Post the conversation and copy the streamed reply to `out` as it arrives.
/// Returns the full reply text.
fn stream_reply(
    client: &reqwest::blocking::Client,
    server: &str,
    conversation: &[Message],
    out: &mut impl Write,
) -> anyhow::Result<String> {
    let url = format!("{}/api/chat", server);
    let mut resp = client.post(&url).json(conversation).send()?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        anyhow::bail!(describe_error(status, &body));
    }

    let mut reply = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = resp.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        out.flush()?;
        reply.extend_from_slice(&buf[..n]);
    }
    writeln!(out)?;

    Ok(String::from_utf8_lossy(&reply).into_owned())
}

fn chat_client() -> anyhow::Result<reqwest::blocking::Client> {
    // Replies stream for as long as the model talks; only bound the connect.
    Ok(reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(None)
        .build()?)
}

fn do_ask(server: &str, question: &str) -> anyhow::Result<()> {
    let client = chat_client()?;
    let stdout = io::stdout();
    stream_reply(&client, server, &[Message::user(question)], &mut stdout.lock())?;
    Ok(())
}

fn do_chat(server: &str) -> anyhow::Result<()> {
    let client = chat_client()?;
    let mut history: Vec<Message> = Vec::new();
    let stdin = io::stdin();

    println!("Ask about professors. Type `exit` to quit.");
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        history.push(Message::user(line));
        match stream_reply(&client, server, &history, &mut io::stdout().lock()) {
            Ok(reply) => history.push(Message::assistant(reply)),
            Err(e) => {
                eprintln!("rateprof-cli: {}", e);
                // Drop the unanswered question so the next turn starts clean.
                history.pop();
            }
        }
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Rateprof server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("Index:           {}", body["index"].as_str().unwrap_or("?"));
            println!("Namespace:       {}", body["namespace"].as_str().unwrap_or("?"));
            println!("Model:           {}", body["model"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("rateprof-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("rateprof-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Ask { question } => do_ask(&cli.server, question),
        Commands::Chat => do_chat(&cli.server),
        Commands::Status => do_status(&cli.server),
    };

    if let Err(e) = result {
        eprintln!("rateprof-cli: {}", e);
        std::process::exit(1);
    }
}
