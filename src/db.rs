use anyhow::Context;
use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::board::MetricBoard;
use crate::calendar;
use crate::config::DatabaseConfig;
use crate::models::{DailyMetric, DailyReport, Metric};

pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .context("failed to connect to Postgres")?;
    tracing::debug!(max_connections = config.max_connections, "connected to Postgres");
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert or replace the stored day for `report.pharmacy_code`.
pub async fn upsert_report(pool: &PgPool, report: &DailyReport) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO pharmacy_trends.daily_reports
        (id, pharmacy_code, report_date, total_turnover, avg_value_per_basket,
         avg_items_per_basket, gp_percent, gp_value, purchases, cost_of_sales,
         cash_sales, account_sales, cod_sales, cash_tenders, credit_card_tenders,
         scripts_dispensed, dispensary_turnover, closing_stock)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (pharmacy_code, report_date) DO UPDATE
        SET total_turnover = EXCLUDED.total_turnover,
            avg_value_per_basket = EXCLUDED.avg_value_per_basket,
            avg_items_per_basket = EXCLUDED.avg_items_per_basket,
            gp_percent = EXCLUDED.gp_percent,
            gp_value = EXCLUDED.gp_value,
            purchases = EXCLUDED.purchases,
            cost_of_sales = EXCLUDED.cost_of_sales,
            cash_sales = EXCLUDED.cash_sales,
            account_sales = EXCLUDED.account_sales,
            cod_sales = EXCLUDED.cod_sales,
            cash_tenders = EXCLUDED.cash_tenders,
            credit_card_tenders = EXCLUDED.credit_card_tenders,
            scripts_dispensed = EXCLUDED.scripts_dispensed,
            dispensary_turnover = EXCLUDED.dispensary_turnover,
            closing_stock = EXCLUDED.closing_stock,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&report.pharmacy_code)
    .bind(report.report_date)
    .bind(report.total_turnover)
    .bind(report.avg_value_per_basket)
    .bind(report.avg_items_per_basket)
    .bind(report.gp_percent)
    .bind(report.gp_value)
    .bind(report.purchases)
    .bind(report.cost_of_sales)
    .bind(report.cash_sales)
    .bind(report.account_sales)
    .bind(report.cod_sales)
    .bind(report.cash_tenders)
    .bind(report.credit_card_tenders)
    .bind(report.scripts_dispensed)
    .bind(report.dispensary_turnover)
    .bind(report.closing_stock)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Record a manually captured turnover figure, leaving other columns untouched.
pub async fn set_turnover(
    pool: &PgPool,
    pharmacy_code: &str,
    report_date: NaiveDate,
    turnover: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO pharmacy_trends.daily_reports (id, pharmacy_code, report_date, total_turnover)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (pharmacy_code, report_date) DO UPDATE
        SET total_turnover = EXCLUDED.total_turnover, updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(pharmacy_code)
    .bind(report_date)
    .bind(turnover)
    .execute(pool)
    .await?;

    tracing::info!(pharmacy = pharmacy_code, date = %report_date, turnover, "turnover recorded");
    Ok(())
}

/// Synthetic history ending at `end`: Sundays are skipped, December peaks,
/// January and February slump, Saturdays are half days and Fridays run hot.
/// Variation is derived from the date so reseeding yields the same rows.
pub fn synthetic_history(
    pharmacy_code: &str,
    end: NaiveDate,
    days: u32,
    base_turnover: f64,
) -> Vec<DailyReport> {
    let (start, end) = calendar::trailing_days(end, days);
    let mut closing_stock = base_turnover * 0.7;

    calendar::days(start, end)
        .filter(|day| day.weekday() != Weekday::Sun)
        .map(|day| {
            let seed = u64::from(day.num_days_from_ce().unsigned_abs());
            let jitter = |mult: u64, span: u64| ((seed * mult) % span) as f64 / span as f64;

            let seasonality = match day.month() {
                12 => 1.25,
                1 | 2 => 0.85,
                _ => 1.0,
            };
            let daily_factor = match day.weekday() {
                Weekday::Sat => 0.5,
                Weekday::Fri => 1.15,
                _ => 1.0,
            };

            let turnover = base_turnover * seasonality * daily_factor * (0.9 + 0.2 * jitter(37, 101));
            let cost_share = 0.65 + 0.13 * jitter(13, 97);
            let cost_of_sales = turnover * cost_share;
            let opening_stock = closing_stock;
            closing_stock = cost_of_sales * (0.75 + 0.5 * jitter(7, 89));
            let adjustments = turnover * (0.02 * jitter(3, 83) - 0.01);
            let dispensary_turnover = turnover * (0.4 + 0.2 * jitter(11, 79));
            let cash_sales = turnover * (0.4 + 0.2 * jitter(17, 73));
            let cash_tenders = cash_sales * (0.95 + 0.1 * jitter(19, 71));

            DailyReport {
                total_turnover: Some(turnover),
                avg_value_per_basket: Some(250.0 + 200.0 * jitter(23, 67)),
                avg_items_per_basket: Some(2.1 + 1.4 * jitter(29, 61)),
                gp_percent: Some((1.0 - cost_share) * 100.0),
                gp_value: Some(turnover - cost_of_sales),
                purchases: Some(closing_stock - opening_stock + cost_of_sales - adjustments),
                cost_of_sales: Some(cost_of_sales),
                cash_sales: Some(cash_sales),
                account_sales: Some(turnover - cash_sales),
                cod_sales: Some(turnover * (0.01 + 0.02 * jitter(31, 59))),
                cash_tenders: Some(cash_tenders),
                credit_card_tenders: Some(turnover - cash_tenders),
                scripts_dispensed: Some((dispensary_turnover / (300.0 + 200.0 * jitter(41, 53))).floor()),
                dispensary_turnover: Some(dispensary_turnover),
                closing_stock: Some(closing_stock),
                ..DailyReport::new(pharmacy_code, day)
            }
        })
        .collect()
}

pub async fn seed(
    pool: &PgPool,
    pharmacy_code: &str,
    end: NaiveDate,
    days: u32,
    base_turnover: f64,
) -> anyhow::Result<usize> {
    let reports = synthetic_history(pharmacy_code, end, days, base_turnover);
    for report in &reports {
        upsert_report(pool, report).await?;
    }
    tracing::info!(pharmacy = pharmacy_code, rows = reports.len(), "seeded daily reports");
    Ok(reports.len())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<DailyReport>().enumerate() {
        let report = result.with_context(|| format!("invalid row {} in {}", line + 1, csv_path.display()))?;
        if upsert_report(pool, &report).await? > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

/// Stored values of one metric for `[start, end]`, ordered by date. Days
/// without a row are simply absent; the aggregator fills them in.
pub async fn fetch_metric(
    pool: &PgPool,
    pharmacy_code: &str,
    metric: Metric,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<DailyMetric>> {
    let query = format!(
        "SELECT report_date, {} AS value \
         FROM pharmacy_trends.daily_reports \
         WHERE pharmacy_code = $1 AND report_date BETWEEN $2 AND $3 \
         ORDER BY report_date",
        metric.column()
    );

    let rows = sqlx::query(&query)
        .bind(pharmacy_code)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch {metric} for {pharmacy_code}"))?;

    Ok(rows
        .into_iter()
        .map(|row| DailyMetric::new(row.get("report_date"), row.get::<Option<f64>, _>("value")))
        .collect())
}

pub async fn fetch_value(
    pool: &PgPool,
    pharmacy_code: &str,
    metric: Metric,
    date: NaiveDate,
) -> anyhow::Result<Option<f64>> {
    let records = fetch_metric(pool, pharmacy_code, metric, date, date).await?;
    Ok(records.into_iter().find_map(|record| record.value))
}

/// Days in `[start, end]` with no turnover captured.
pub async fn missing_turnover_dates(
    pool: &PgPool,
    pharmacy_code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<NaiveDate>> {
    let recorded: Vec<NaiveDate> = sqlx::query(
        r#"
        SELECT report_date
        FROM pharmacy_trends.daily_reports
        WHERE pharmacy_code = $1
          AND report_date BETWEEN $2 AND $3
          AND total_turnover IS NOT NULL
        "#,
    )
    .bind(pharmacy_code)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get("report_date"))
    .collect();

    Ok(calendar::missing_days(&recorded, start, end)?)
}

/// Fetch several metrics concurrently. Each metric resolves on its own, so
/// one failing query leaves the others intact on the board.
pub async fn fetch_board(
    pool: &PgPool,
    pharmacy_code: &str,
    requests: &[(Metric, NaiveDate, NaiveDate)],
) -> MetricBoard<Vec<DailyMetric>> {
    let mut board = MetricBoard::new();
    let mut tasks = JoinSet::new();

    for &(metric, start, end) in requests {
        board.request(metric.api_field());
        let pool = pool.clone();
        let pharmacy_code = pharmacy_code.to_string();
        tasks.spawn(async move {
            let result = fetch_metric(&pool, &pharmacy_code, metric, start, end).await;
            (metric, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((metric, result)) => board.resolve(metric.api_field(), result),
            Err(err) => tracing::error!(error = %err, "metric fetch task panicked"),
        }
    }

    board
}
