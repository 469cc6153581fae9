//! # Sales Statistics
//!
//! Period windows, sale filters and the aggregate shown on the dashboard.
//!
//! ## Period Windows
//! ```text
//!   Day    now - 1 day
//!   Week   now - 7 days
//!   Month  now - 1 calendar month   (default)
//!   Year   now - 12 calendar months
//! ```
//! A sale is in the window when `timestamp >= window_start(now)`.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PaymentMethod, Sale};
use crate::TOP_ITEMS_LIMIT;

// =============================================================================
// Period
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StatsPeriod {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl StatsPeriod {
    /// First instant included in the period ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            StatsPeriod::Day => Some(now - Duration::days(1)),
            StatsPeriod::Week => Some(now - Duration::days(7)),
            StatsPeriod::Month => now.checked_sub_months(Months::new(1)),
            StatsPeriod::Year => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for StatsPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(StatsPeriod::Day),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            other => Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: format!("unknown period '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Sale Filter
// =============================================================================

/// Ledger query. Bounds are inclusive; absent terms match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SaleFilter {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    #[ts(type = "number | null")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl SaleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn matches(&self, sale: &Sale) -> bool {
        self.start.map_or(true, |s| sale.timestamp >= s)
            && self.end.map_or(true, |e| sale.timestamp <= e)
            && self.payment_method.map_or(true, |m| sale.payment_method == m)
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Revenue contributed by one item across a set of sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TopItem {
    pub item_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SalesStats {
    pub total_sales: usize,
    pub total_revenue: Money,
    pub average_ticket: Money,
    pub top_items: Vec<TopItem>,
}

/// Aggregates `sales` into totals and the top items by revenue.
///
/// Ranking is by cumulative line revenue per item id, descending. Items
/// with equal revenue keep the order in which they were first seen.
pub fn compute_stats(sales: &[Sale]) -> SalesStats {
    let total_revenue: Money = sales.iter().map(|s| s.total).sum();

    let mut ranking: Vec<TopItem> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for line in sales.iter().flat_map(|s| s.lines.iter()) {
        match index.get(line.item_id.as_str()) {
            Some(&i) => {
                ranking[i].quantity += line.quantity;
                ranking[i].revenue += line.total_price;
            }
            None => {
                index.insert(line.item_id.as_str(), ranking.len());
                ranking.push(TopItem {
                    item_id: line.item_id.clone(),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    revenue: line.total_price,
                });
            }
        }
    }

    // Stable, so ties stay in first-seen order
    ranking.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    ranking.truncate(TOP_ITEMS_LIMIT);

    SalesStats {
        total_sales: sales.len(),
        total_revenue,
        average_ticket: total_revenue.split(sales.len()),
        top_items: ranking,
    }
}
