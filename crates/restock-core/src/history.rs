//! History aggregation
//!
//! Computes price statistics and a monthly consumption rate from the
//! persisted purchase history of one product. Rows with a different unit,
//! a non-positive or missing price/quantity, or no date are skipped.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{HistoryRecord, Summary};
use crate::normalize::normalize;

/// Average month length used to turn a day span into months
pub const DAYS_PER_MONTH: f64 = 30.44;

/// Shortest span, in days, used as the consumption denominator
pub const MIN_SPAN_DAYS: i64 = 1;

/// Records saved under the given product, compared by normalized name
pub fn rows_for_product<'a>(records: &'a [HistoryRecord], product: &str) -> Vec<&'a HistoryRecord> {
    let key = normalize(product);
    records
        .iter()
        .filter(|r| normalize(&r.product) == key)
        .collect()
}

/// Most frequent non-empty unit among the rows (first seen wins a tie)
pub fn dominant_unit<'a>(rows: impl IntoIterator<Item = &'a HistoryRecord>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, row) in rows.into_iter().enumerate() {
        let unit = row.unit.trim();
        if unit.is_empty() {
            continue;
        }
        counts.entry(unit).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then_with(|| first_b.cmp(first_a))
        })
        .map(|(unit, _)| unit.to_string())
}

struct ValidRow {
    date: NaiveDate,
    price: f64,
    quantity: f64,
}

fn valid_row(row: &HistoryRecord, unit: &str) -> Option<ValidRow> {
    if row.unit.trim() != unit {
        return None;
    }
    let price = row.unit_price.filter(|p| p.is_finite() && *p > 0.0)?;
    let quantity = row.quantity.filter(|q| q.is_finite() && *q > 0.0)?;
    let date = row.purchase_date?;
    Some(ValidRow {
        date,
        price,
        quantity,
    })
}

/// Summarize the rows recorded with `unit`
///
/// With `exclude_latest`, the quantity of the single most recent purchase is
/// left out of the consumption numerator; the span still reaches its date.
pub fn summarize<'a>(
    rows: impl IntoIterator<Item = &'a HistoryRecord>,
    unit: &str,
    exclude_latest: bool,
) -> Option<Summary> {
    let unit = unit.trim();
    let mut valid: Vec<ValidRow> = rows
        .into_iter()
        .filter_map(|row| valid_row(row, unit))
        .collect();

    if valid.is_empty() {
        return None;
    }

    // Stable sort keeps insertion order for same-day purchases
    valid.sort_by_key(|r| r.date);

    let period_start = valid[0].date;
    let period_end = valid[valid.len() - 1].date;

    let price_min = valid.iter().map(|r| r.price).fold(f64::INFINITY, f64::min);
    let price_max = valid.iter().map(|r| r.price).fold(f64::NEG_INFINITY, f64::max);
    let total_quantity: f64 = valid.iter().map(|r| r.quantity).sum();
    let weighted: f64 = valid.iter().map(|r| r.price * r.quantity).sum();
    let price_avg = weighted / total_quantity;

    let consumed_units = if exclude_latest {
        valid[..valid.len() - 1].iter().map(|r| r.quantity).sum()
    } else {
        total_quantity
    };

    let span_days = (period_end - period_start).num_days().max(MIN_SPAN_DAYS);
    let months = span_days as f64 / DAYS_PER_MONTH;

    Some(Summary {
        unit: unit.to_string(),
        period_start,
        period_end,
        purchases: valid.len(),
        price_min,
        price_max,
        price_avg,
        consumed_units,
        monthly_consumption: consumed_units / months,
        excludes_latest: exclude_latest,
    })
}

/// Parse a number written in the Chilean convention, tolerating plain decimals
///
/// A comma is the decimal separator and dots group thousands (`"4.590"`,
/// `"1.234,5"`). Without a comma, dots followed by groups of exactly three
/// digits are thousands separators; any other dot is a decimal point
/// (`"0.5"`, `"1234.5"`). Blank input gives `None`.
pub fn parse_number(text: &str) -> Option<f64> {
    let s = text.trim().trim_start_matches('$').trim();
    if s.is_empty() {
        return None;
    }

    let cleaned = if s.contains(',') || dots_group_thousands(s) {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn dots_group_thousands(s: &str) -> bool {
    let mut parts = s.split('.');
    let head = parts.next().unwrap_or_default();
    let mut groups = parts.peekable();
    groups.peek().is_some()
        && !head.trim_start_matches('-').is_empty()
        && groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Format a number so `parse_number` reads it back unchanged
pub fn format_number(value: f64) -> String {
    value.to_string().replace('.', ",")
}

/// Parse a purchase date in the formats found in hand-kept histories
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d/%m/%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }

    None
}
