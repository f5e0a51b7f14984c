use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::PgPool;

use pharmacy_trends::config::{DatabaseConfig, LoggingConfig};
use pharmacy_trends::{calendar, db, report, yoy};
use pharmacy_trends::{AggregationPolicy, Bucket, Metric, RangeAggregator};

#[derive(Parser)]
#[command(name = "pharmacy-trends")]
#[command(about = "Daily pharmacy sales series, year-over-year comparisons and dashboard reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Insert deterministic synthetic history for a pharmacy
    Seed {
        #[arg(long)]
        pharmacy: String,
        #[arg(long, default_value_t = 730)]
        days: u32,
        #[arg(long, default_value_t = 87_000.0)]
        base_turnover: f64,
    },
    /// Import daily reports from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a turnover figure captured by hand
    SetTurnover {
        #[arg(long)]
        pharmacy: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
        #[arg(long)]
        turnover: f64,
    },
    /// List days without a turnover figure
    Missing {
        #[arg(long)]
        pharmacy: String,
        #[arg(long, value_parser = parse_date_arg)]
        start: NaiveDate,
        #[arg(long, value_parser = parse_date_arg)]
        end: NaiveDate,
    },
    /// Print a dense series for one metric
    Series {
        #[arg(long)]
        pharmacy: String,
        #[arg(long, value_enum)]
        metric: Metric,
        #[arg(long, value_parser = parse_date_arg)]
        start: NaiveDate,
        #[arg(long, value_parser = parse_date_arg)]
        end: NaiveDate,
        /// Defaults to the metric's natural policy
        #[arg(long, value_enum)]
        policy: Option<AggregationPolicy>,
        #[arg(long, value_enum, default_value_t = Bucket::Day)]
        bucket: Bucket,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Compare a day with the same weekday one year earlier
    Yoy {
        #[arg(long)]
        pharmacy: String,
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
        #[arg(long, value_enum, default_value_t = Metric::Turnover)]
        metric: Metric,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the weekday-aligned date one year earlier
    Align {
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long)]
        pharmacy: String,
        /// Defaults to today
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

async fn connect() -> anyhow::Result<PgPool> {
    let config = DatabaseConfig::from_env()?;
    db::connect(&config).await
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    calendar::parse_date(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::from_env().init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Align { date } => {
            let aligned = yoy::align_to_prior_year(date);
            println!(
                "{} ({}) -> {} ({})",
                date,
                date.format("%A"),
                aligned,
                aligned.format("%A")
            );
        }
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed {
            pharmacy,
            days,
            base_turnover,
        } => {
            let pool = connect().await?;
            let today = Local::now().date_naive();
            let inserted = db::seed(&pool, &pharmacy, today, days, base_turnover).await?;
            println!("Seeded {inserted} days for {pharmacy}.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Imported {inserted} daily reports from {}.", csv.display());
        }
        Commands::SetTurnover {
            pharmacy,
            date,
            turnover,
        } => {
            let pool = connect().await?;
            db::set_turnover(&pool, &pharmacy, date, turnover).await?;
            println!("Turnover for {pharmacy} on {date} set to {turnover:.2}.");
        }
        Commands::Missing {
            pharmacy,
            start,
            end,
        } => {
            let pool = connect().await?;
            let missing = db::missing_turnover_dates(&pool, &pharmacy, start, end).await?;
            if missing.is_empty() {
                println!("Turnover captured for every day from {start} to {end}.");
            } else {
                println!("{} days without turnover:", missing.len());
                for day in missing {
                    println!("- {day} ({})", day.format("%A"));
                }
            }
        }
        Commands::Series {
            pharmacy,
            metric,
            start,
            end,
            policy,
            bucket,
            format,
        } => {
            let pool = connect().await?;
            let records = db::fetch_metric(&pool, &pharmacy, metric, start, end).await?;
            let policy = policy.unwrap_or_else(|| metric.default_policy());
            let series = RangeAggregator::new(policy, bucket)
                .rounding(metric.rounding())
                .aggregate(&records, start, end)
                .with_context(|| format!("failed to build {metric} series"))?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&series)?),
                OutputFormat::Text => {
                    println!("{} for {pharmacy}, {start} to {end}:", metric.label());
                    for point in &series {
                        match point.value {
                            Some(value) => println!("{}  {value}", point.key),
                            None => println!("{}  -", point.key),
                        }
                    }
                }
            }
        }
        Commands::Yoy {
            pharmacy,
            date,
            metric,
            format,
        } => {
            let pool = connect().await?;
            let prior_date = yoy::align_to_prior_year(date);
            let current = db::fetch_value(&pool, &pharmacy, metric, date).await?;
            let prior = db::fetch_value(&pool, &pharmacy, metric, prior_date).await?;
            let pair = yoy::compare(date, |day| if day == date { current } else { prior });

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pair)?),
                OutputFormat::Text => {
                    println!(
                        "{} on {} ({}): {:.2}",
                        metric.label(),
                        pair.current_date,
                        pair.current_date.format("%A"),
                        pair.current_value
                    );
                    println!(
                        "{} on {} ({}): {:.2}",
                        metric.label(),
                        pair.prior_date,
                        pair.prior_date.format("%A"),
                        pair.prior_value
                    );
                    match pair.change_percent() {
                        Some(change) => println!("Change: {change:.1}%"),
                        None => println!("Change: n/a (nothing recorded last year)"),
                    }
                }
            }
        }
        Commands::Report {
            pharmacy,
            date,
            out,
        } => {
            let pool = connect().await?;
            let as_of = date.unwrap_or_else(|| Local::now().date_naive());
            let requests = report::dashboard_requests(as_of);
            let board = db::fetch_board(&pool, &pharmacy, &requests).await;
            for (metric, message) in board.failures() {
                tracing::warn!(metric, message, "dashboard metric unavailable");
            }
            let markdown = report::build_report(&pharmacy, as_of, &board)?;
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
