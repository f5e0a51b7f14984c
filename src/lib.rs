//! Chart-ready series for pharmacy point-of-sale reporting.

pub mod aggregate;
pub mod board;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod yoy;

pub use aggregate::{aggregate, KeyStyle, RangeAggregator, Rounding};
pub use board::{MetricBoard, MetricState};
pub use error::{Result, SeriesError};
pub use models::{AggregationPolicy, Bucket, DailyMetric, Metric, SeriesPoint, YoyPair};
pub use yoy::align_to_prior_year;
