use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the marketplace security gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key (Bearer token)
    #[arg(short, long)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gate status
    Status,
    /// Performance statistics for a timeframe
    Stats {
        #[arg(short, long, default_value = "hour")]
        timeframe: String,
    },
    /// Performance alerts from the last N hours
    Alerts {
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
    /// Human-readable performance report
    Report {
        #[arg(short, long, default_value = "day")]
        timeframe: String,
    },
    /// Query the audit log
    Audit {
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        severity: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Audit statistics for a timeframe
    AuditStats {
        #[arg(short, long, default_value = "day")]
        timeframe: String,
    },
    /// Blocked IPs, suspicion counters and rate-limit usage
    Security,
    /// Block an IP for the configured TTL
    Block { ip: String },
    /// Lift a block
    Unblock { ip: String },
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

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Stats { timeframe } => client
            .get(format!("{}/admin/stats", base))
            .query(&[("timeframe", timeframe)]),
        Commands::Alerts { hours } => client
            .get(format!("{}/admin/alerts", base))
            .query(&[("hours", hours)]),
        Commands::Report { timeframe } => {
            let res = client
                .get(format!("{}/admin/report", base))
                .query(&[("timeframe", timeframe)])
                .headers(headers)
                .send()
                .await?;
            return print_text(res).await;
        }
        Commands::Audit {
            action,
            severity,
            user_id,
            limit,
        } => {
            let mut params = vec![("limit", limit.to_string())];
            params.extend(action.map(|a| ("action", a)));
            params.extend(severity.map(|s| ("severity", s)));
            params.extend(user_id.map(|u| ("user_id", u)));
            client.get(format!("{}/admin/audit", base)).query(&params)
        }
        Commands::AuditStats { timeframe } => client
            .get(format!("{}/admin/audit/stats", base))
            .query(&[("timeframe", timeframe)]),
        Commands::Security => client.get(format!("{}/admin/security", base)),
        Commands::Block { ip } => client.post(format!("{}/admin/block/{}", base, ip)),
        Commands::Unblock { ip } => client.delete(format!("{}/admin/block/{}", base, ip)),
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
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if status.is_success() {
        println!("{}", text);
    } else {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("Response: {}", text);
    }
    Ok(())
}
