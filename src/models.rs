use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::Rounding;

/// One day's measurement as returned for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl DailyMetric {
    pub fn new(date: NaiveDate, value: impl Into<Option<f64>>) -> Self {
        Self {
            date,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub key: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Running total; gaps repeat the last cumulative value.
    CarryForward,
    /// Raw value per bucket, 0 where nothing was recorded.
    ZeroFill,
    /// Mean of the samples in each bucket, null where there are none.
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Day,
    Month,
}

/// Daily measures stored per pharmacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Turnover,
    AvgBasketValue,
    AvgBasketSize,
    GpPercent,
    GpValue,
    Purchases,
    CostOfSales,
    CashSales,
    AccountSales,
    CodSales,
    CashTenders,
    CreditCardTenders,
    ScriptsDispensed,
    DispensaryTurnover,
    ClosingStock,
}

impl Metric {
    /// Column in `daily_reports`. Only these names are ever interpolated into SQL.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Turnover => "total_turnover",
            Metric::AvgBasketValue => "avg_value_per_basket",
            Metric::AvgBasketSize => "avg_items_per_basket",
            Metric::GpPercent => "gp_percent",
            Metric::GpValue => "gp_value",
            Metric::Purchases => "purchases",
            Metric::CostOfSales => "cost_of_sales",
            Metric::CashSales => "cash_sales",
            Metric::AccountSales => "account_sales",
            Metric::CodSales => "cod_sales",
            Metric::CashTenders => "cash_tenders",
            Metric::CreditCardTenders => "credit_card_tenders",
            Metric::ScriptsDispensed => "scripts_dispensed",
            Metric::DispensaryTurnover => "dispensary_turnover",
            Metric::ClosingStock => "closing_stock",
        }
    }

    /// Field name used by the reporting API rows (`{date, <field>}`).
    pub fn api_field(self) -> &'static str {
        match self {
            Metric::Turnover => "turnover",
            Metric::AvgBasketValue => "avg_basket_value",
            Metric::AvgBasketSize => "avg_basket_size",
            Metric::GpPercent => "gp_percent",
            Metric::GpValue => "gp_value",
            Metric::Purchases => "purchases",
            Metric::CostOfSales => "cost_of_sales",
            Metric::CashSales => "cash_sales",
            Metric::AccountSales => "account_sales",
            Metric::CodSales => "cod_sales",
            Metric::CashTenders => "cash_tenders",
            Metric::CreditCardTenders => "credit_card_tenders",
            Metric::ScriptsDispensed => "scripts_dispensed",
            Metric::DispensaryTurnover => "dispensary_turnover",
            Metric::ClosingStock => "closing_stock",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Turnover => "Turnover",
            Metric::AvgBasketValue => "Avg basket value",
            Metric::AvgBasketSize => "Avg basket size",
            Metric::GpPercent => "GP %",
            Metric::GpValue => "GP value",
            Metric::Purchases => "Purchases",
            Metric::CostOfSales => "Cost of sales",
            Metric::CashSales => "Cash sales",
            Metric::AccountSales => "Account sales",
            Metric::CodSales => "COD sales",
            Metric::CashTenders => "Cash tenders",
            Metric::CreditCardTenders => "Credit card tenders",
            Metric::ScriptsDispensed => "Scripts dispensed",
            Metric::DispensaryTurnover => "Dispensary turnover",
            Metric::ClosingStock => "Closing stock",
        }
    }

    /// Ratios and per-basket figures are averaged, never summed.
    pub fn is_ratio(self) -> bool {
        matches!(
            self,
            Metric::AvgBasketValue | Metric::AvgBasketSize | Metric::GpPercent
        )
    }

    /// Ratios keep cents; everything else is reported in whole units.
    pub fn rounding(self) -> Rounding {
        if self.is_ratio() {
            Rounding::Cents
        } else {
            Rounding::Whole
        }
    }

    pub fn default_policy(self) -> AggregationPolicy {
        match self {
            _ if self.is_ratio() => AggregationPolicy::Average,
            Metric::ClosingStock | Metric::ScriptsDispensed => AggregationPolicy::ZeroFill,
            _ => AggregationPolicy::CarryForward,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_field())
    }
}

/// A day compared with its weekday-aligned counterpart one year earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoyPair {
    pub current_date: NaiveDate,
    pub prior_date: NaiveDate,
    pub current_value: f64,
    pub prior_value: f64,
}

impl YoyPair {
    pub fn change(&self) -> f64 {
        self.current_value - self.prior_value
    }

    /// Percentage change, only meaningful when last year had a positive value.
    pub fn change_percent(&self) -> Option<f64> {
        if self.prior_value > 0.0 {
            Some(self.change() / self.prior_value * 100.0)
        } else {
            None
        }
    }
}

/// One row of a current-versus-last-year cumulative chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRow {
    pub key: String,
    pub current_year: f64,
    pub previous_year: f64,
}

/// One stored day for one pharmacy; every metric column is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub pharmacy_code: String,
    pub report_date: NaiveDate,
    pub total_turnover: Option<f64>,
    pub avg_value_per_basket: Option<f64>,
    pub avg_items_per_basket: Option<f64>,
    pub gp_percent: Option<f64>,
    pub gp_value: Option<f64>,
    pub purchases: Option<f64>,
    pub cost_of_sales: Option<f64>,
    pub cash_sales: Option<f64>,
    pub account_sales: Option<f64>,
    pub cod_sales: Option<f64>,
    pub cash_tenders: Option<f64>,
    pub credit_card_tenders: Option<f64>,
    pub scripts_dispensed: Option<f64>,
    pub dispensary_turnover: Option<f64>,
    pub closing_stock: Option<f64>,
}

impl DailyReport {
    pub fn new(pharmacy_code: impl Into<String>, report_date: NaiveDate) -> Self {
        Self {
            pharmacy_code: pharmacy_code.into(),
            report_date,
            total_turnover: None,
            avg_value_per_basket: None,
            avg_items_per_basket: None,
            gp_percent: None,
            gp_value: None,
            purchases: None,
            cost_of_sales: None,
            cash_sales: None,
            account_sales: None,
            cod_sales: None,
            cash_tenders: None,
            credit_card_tenders: None,
            scripts_dispensed: None,
            dispensary_turnover: None,
            closing_stock: None,
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Turnover => self.total_turnover,
            Metric::AvgBasketValue => self.avg_value_per_basket,
            Metric::AvgBasketSize => self.avg_items_per_basket,
            Metric::GpPercent => self.gp_percent,
            Metric::GpValue => self.gp_value,
            Metric::Purchases => self.purchases,
            Metric::CostOfSales => self.cost_of_sales,
            Metric::CashSales => self.cash_sales,
            Metric::AccountSales => self.account_sales,
            Metric::CodSales => self.cod_sales,
            Metric::CashTenders => self.cash_tenders,
            Metric::CreditCardTenders => self.credit_card_tenders,
            Metric::ScriptsDispensed => self.scripts_dispensed,
            Metric::DispensaryTurnover => self.dispensary_turnover,
            Metric::ClosingStock => self.closing_stock,
        }
    }
}
