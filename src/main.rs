use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stock_insights::api::DEFAULT_RISK_LEVEL;
use stock_insights::{Config, FinancialDataProvider, StockApiClient};

#[derive(Parser)]
#[command(name = "stock-insights")]
#[command(about = "Query the stock analysis API with caching and retries")]
struct Cli {
    /// Override the cache freshness window, in seconds
    #[arg(long, global = true)]
    cache_ttl_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search stocks by ticker or company name
    Search { query: String },
    /// Company profile and risk assessment
    Info {
        ticker: String,
        #[arg(long, default_value = DEFAULT_RISK_LEVEL)]
        risk_level: String,
    },
    /// P/E ratio and balance sheet
    Financials { ticker: String },
    /// Comprehensive financial report
    Report { ticker: String },
    /// Recent news articles
    News { ticker: String },
    /// Investment analysis
    Analysis { ticker: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stock_insights=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!("🔌 Using API at {}", config.api_base_url);

    let mut client = StockApiClient::new(&config)?;
    if let Some(secs) = cli.cache_ttl_secs {
        client = client.with_cache_ttl(Duration::from_secs(secs));
    }

    match cli.command {
        Command::Search { query } => print_json(&client.search_stocks(&query).await)?,
        Command::Info { ticker, risk_level } => {
            print_json(&client.get_stock_info(&ticker, &risk_level).await?)?
        }
        Command::Financials { ticker } => print_json(&client.get_financial_data(&ticker).await?)?,
        Command::Report { ticker } => print_json(&client.get_financial_report(&ticker).await?)?,
        Command::News { ticker } => print_json(&client.get_stock_news(&ticker).await?)?,
        Command::Analysis { ticker } => {
            print_json(&client.get_financial_analysis(&ticker).await?)?
        }
    }

    Ok(())
}
