use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the egress proxy", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "EGRESS_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// List circuit breaker state for every mapping
    Breakers,
    /// Show the circuit breaker for one mapping key
    Breaker { key: String },
    /// Force a mapping's circuit breaker back to closed
    Reset { key: String },
}

/// `base` + `/admin/breakers/<key>[/suffix]`, with the key percent-encoded as
/// one path segment.
fn breaker_url(base: &Url, key: &str, suffix: Option<&str>) -> Result<Url, Box<dyn std::error::Error>> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| "admin URL cannot be a base")?;
        segments.pop_if_empty().extend(["admin", "breakers", key]);
        if let Some(suffix) = suffix {
            segments.push(suffix);
        }
    }
    Ok(url)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = Url::parse(&cli.url)?;
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(base.join("admin/status")?),
        Commands::Breakers => client.get(base.join("admin/breakers")?),
        Commands::Breaker { key } => client.get(breaker_url(&base, key, None)?),
        Commands::Reset { key } => client.post(breaker_url(&base, key, Some("reset"))?),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
