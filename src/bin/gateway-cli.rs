use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the strategy gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Sent as `x-api-key`.
    #[arg(short, long, env = "GATEWAY_API_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status and per-service breaker state
    Health,
    /// List registered services
    Services,
    /// Send a GET through the gateway to a service path
    Get {
        service: String,
        #[arg(default_value = "/")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert("x-api-key", HeaderValue::from_str(key)?);
    }

    let url = match &cli.command {
        Commands::Health => format!("{}/health", cli.url),
        Commands::Services => format!("{}/api/gateway", cli.url),
        Commands::Get { service, path } => format!(
            "{}/api/gateway/{}/{}",
            cli.url,
            service,
            path.trim_start_matches('/')
        ),
    };

    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    for name in ["x-gateway-request-id", "x-gateway-response-time", "x-ratelimit-remaining"] {
        if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
            eprintln!("{name}: {value}");
        }
    }

    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
