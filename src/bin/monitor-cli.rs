use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "monitor-cli")]
#[command(about = "Admin client for a running situation monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh state and version
    Status,
    /// Circuit, cache and in-flight requests per service
    Services,
    /// Vendor rate limit usage
    RateLimits,
    /// Start a refresh cycle
    Refresh {
        /// Critical tier only
        #[arg(long)]
        quick: bool,
    },
    /// Force a service's circuit closed
    Reset { service: String },
    /// Drop a service's cached responses
    ClearCache { service: String },
    /// Clear the refresh error list
    ClearErrors,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = match &cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string()),
        Commands::Services => (Method::GET, "/admin/services".to_string()),
        Commands::RateLimits => (Method::GET, "/admin/rate-limits".to_string()),
        Commands::Refresh { quick } => (Method::POST, format!("/admin/refresh?quick={quick}")),
        Commands::Reset { service } => (Method::POST, format!("/admin/services/{service}/reset")),
        Commands::ClearCache { service } => {
            (Method::DELETE, format!("/admin/services/{service}/cache"))
        }
        Commands::ClearErrors => (Method::DELETE, "/admin/errors".to_string()),
    };

    let res = client
        .request(method, format!("{}{}", cli.url, path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    if status == StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
