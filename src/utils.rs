use crate::error::{AgingError, Result};
use crate::schema::MonthlySnapshot;
use chrono::{Datelike, Months, NaiveDate};
use num_format::{Locale, ToFormattedString as _};

/// Rounds to whole currency units (half away from zero).
pub fn round_amount(value: f64) -> f64 {
    let rounded = value.round();
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// US-dollar amount with no decimals, e.g. `$1,234` or `-$50`.
pub fn format_currency(value: f64) -> String {
    let rounded = round_amount(value);
    let digits = (rounded.abs() as i64).to_formatted_string(&Locale::en);
    if rounded < 0.0 {
        format!("-${}", digits)
    } else {
        format!("${}", digits)
    }
}

/// Currency with an explicit `+` on non-negative values, for deltas.
pub fn format_signed_currency(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", format_currency(value))
    } else {
        format_currency(value)
    }
}

/// One decimal with an explicit sign, e.g. `+12.5%`.
pub fn format_percentage(value: f64) -> String {
    if value >= 0.0 {
        format!("+{:.1}%", value)
    } else {
        format!("{:.1}%", value)
    }
}

/// Parses `YYYY-MM` into the first day of that month. Surrounding
/// whitespace is rejected so that month strings also order correctly.
pub fn parse_month(month: &str) -> Result<NaiveDate> {
    if month.len() != 7 || month.trim() != month {
        return Err(AgingError::InvalidMonth(month.to_string()));
    }

    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map_err(|_| AgingError::InvalidMonth(month.to_string()))
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn next_month(month: &str) -> Result<String> {
    let date = parse_month(month)?;
    date.checked_add_months(Months::new(1))
        .map(month_key)
        .ok_or_else(|| AgingError::InvalidMonth(month.to_string()))
}

pub fn previous_month(month: &str) -> Result<String> {
    let date = parse_month(month)?;
    date.checked_sub_months(Months::new(1))
        .map(month_key)
        .ok_or_else(|| AgingError::InvalidMonth(month.to_string()))
}

/// `"2024-03"` -> `"March 2024"`. Unparseable input renders as `N/A`.
pub fn format_month(month: &str) -> String {
    match parse_month(month) {
        Ok(date) => date.format("%B %Y").to_string(),
        Err(_) => "N/A".to_string(),
    }
}

/// `"2024-03"` -> `"Mar"`.
pub fn format_month_short(month: &str) -> String {
    match parse_month(month) {
        Ok(date) => date.format("%b").to_string(),
        Err(_) => "N/A".to_string(),
    }
}

pub fn month_year(month: &str) -> Option<i32> {
    parse_month(month).ok().map(|d| d.year())
}

/// Sorts snapshots chronologically. `YYYY-MM` sorts lexicographically in
/// calendar order, so a string sort is sufficient.
pub fn sort_history(snapshots: &mut [MonthlySnapshot]) {
    snapshots.sort_by(|a, b| a.month.cmp(&b.month));
}

/// Distinct years present in `months`, most recent first.
pub fn available_years<'a, I>(months: I) -> Vec<i32>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut years: Vec<i32> = months.into_iter().filter_map(month_year).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

/// Rejects a forecast month earlier than the first month after the client's data.
pub fn validate_target_month(requested: &str, minimum: Option<&str>) -> Result<()> {
    let requested_date = parse_month(requested)?;
    if let Some(minimum) = minimum {
        if requested_date < parse_month(minimum)? {
            return Err(AgingError::TargetMonthTooEarly {
                requested: requested.to_string(),
                minimum: minimum.to_string(),
            });
        }
    }
    Ok(())
}
