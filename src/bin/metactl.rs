use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "metactl")]
#[command(about = "CLI for a metaraft node")]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8300")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Status,
    Members,
    Get {
        key: String,
    },
    Put {
        key: String,
        /// JSON value; plain text is stored as a string.
        value: String,
    },
    Delete {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base_url = cli.addr;

    match cli.command {
        Commands::Status => {
            let resp: Value = client
                .get(format!("{}/status", base_url))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Members => {
            let resp: Value = client
                .get(format!("{}/members", base_url))
                .send()
                .await?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::Get { key } => {
            let resp = client
                .get(format!("{}/metadata/{}", base_url, key))
                .send()
                .await?;
            let status = resp.status();
            let body: Value = resp.json().await?;
            if !status.is_success() {
                anyhow::bail!("{}: {}", status, body);
            }
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Put { key, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            let resp = client
                .put(format!("{}/metadata/{}", base_url, key))
                .json(&value)
                .send()
                .await?;
            check(resp).await?;
        }
        Commands::Delete { key } => {
            let resp = client
                .delete(format!("{}/metadata/{}", base_url, key))
                .send()
                .await?;
            check(resp).await?;
        }
    }

    Ok(())
}

async fn check(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    if status.is_success() {
        println!("ok");
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{}: {}", status, body)
}
