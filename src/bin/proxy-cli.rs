use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the intercepting proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "PROXY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status
    Status,
    /// Show connection, session and certificate counters
    Stats,
    /// List cached leaf certificate subjects
    Certificates,
    /// Download the CA certificate clients must trust
    Ca {
        /// Write the PEM here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{base}/admin/status")).send().await?;
            print_json(res).await?;
        }
        Commands::Stats => {
            let res = client.get(format!("{base}/admin/stats")).send().await?;
            print_json(res).await?;
        }
        Commands::Certificates => {
            let res = client.get(format!("{base}/admin/certificates")).send().await?;
            print_json(res).await?;
        }
        Commands::Ca { out } => {
            let res = client.get(format!("{base}/admin/ca.pem")).send().await?;
            let Some(res) = check_status(res).await else {
                return Ok(());
            };
            let pem = res.text().await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, pem)?;
                    println!("CA certificate written to {}", path.display());
                }
                None => print!("{pem}"),
            }
        }
    }

    Ok(())
}

async fn check_status(res: reqwest::Response) -> Option<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Some(res);
    }
    eprintln!("Error: Admin API returned status {}", status);
    if let Ok(text) = res.text().await {
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
    }
    None
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let Some(res) = check_status(res).await else {
        return Ok(());
    };
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
