use crate::error::{AgingError, Result};
use crate::schema::{AgingBuckets, ClientHistory, MonthlyRecord, MonthlySnapshot};
use crate::utils::parse_month;
use csv::StringRecord;
use log::{debug, info};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// One line of an aging report, tagged with the month it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct AgingRow {
    pub month: String,
    pub description: String,
    pub days_0_30: f64,
    pub days_31_60: f64,
    pub days_61_90: f64,
    pub days_90_plus: f64,
    /// Reported total; recomputed from the buckets when absent.
    pub total: Option<f64>,
    pub predicted: bool,
}

impl AgingRow {
    fn into_record(self) -> MonthlyRecord {
        let aging = AgingBuckets::new(
            self.days_0_30,
            self.days_31_60,
            self.days_61_90,
            self.days_90_plus,
        );
        let mut record = MonthlyRecord::new(self.description, aging);
        if let Some(total) = self.total {
            record.total = total;
        }
        record.predicted = self.predicted;
        record
    }
}

/// Groups flat rows into one snapshot per month, in chronological order.
pub fn rows_to_history(rows: Vec<AgingRow>) -> Result<ClientHistory> {
    let mut by_month: BTreeMap<String, Vec<MonthlyRecord>> = BTreeMap::new();

    for row in rows {
        parse_month(&row.month)?;
        by_month
            .entry(row.month.clone())
            .or_default()
            .push(row.into_record());
    }

    let history: Vec<MonthlySnapshot> = by_month
        .into_iter()
        .map(|(month, records)| MonthlySnapshot::from_records(month, records))
        .collect();

    info!("Built history with {} months", history.len());
    Ok(ClientHistory::new(history))
}

/// Header names used to locate each column in an uploaded sheet.
///
/// Headers are compared case-insensitively with a trailing "days" ignored, so
/// "0-30 Days" matches "0-30".
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub description: String,
    pub days_0_30: String,
    pub days_31_60: String,
    pub days_61_90: String,
    pub days_90_plus: String,
    pub total: Option<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            description: "Description".to_string(),
            days_0_30: "0-30".to_string(),
            days_31_60: "31-60".to_string(),
            days_61_90: "61-90".to_string(),
            days_90_plus: "90+".to_string(),
            total: Some("Total".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    description: usize,
    days_0_30: usize,
    days_31_60: usize,
    days_61_90: usize,
    days_90_plus: usize,
    total: Option<usize>,
}

fn header_key(header: &str) -> String {
    let lowered = header.trim().to_lowercase();
    lowered
        .strip_suffix("days")
        .unwrap_or(lowered.as_str())
        .trim()
        .to_string()
}

impl ColumnMapping {
    fn locate(headers: &StringRecord, name: &str) -> Option<usize> {
        let wanted = header_key(name);
        headers.iter().position(|h| header_key(h) == wanted)
    }

    fn require(headers: &StringRecord, name: &str) -> Result<usize> {
        Self::locate(headers, name).ok_or_else(|| AgingError::MissingColumn(name.to_string()))
    }

    fn resolve(&self, headers: &StringRecord) -> Result<ColumnIndices> {
        Ok(ColumnIndices {
            description: Self::require(headers, &self.description)?,
            days_0_30: Self::require(headers, &self.days_0_30)?,
            days_31_60: Self::require(headers, &self.days_31_60)?,
            days_61_90: Self::require(headers, &self.days_61_90)?,
            days_90_plus: Self::require(headers, &self.days_90_plus)?,
            total: self
                .total
                .as_deref()
                .and_then(|name| Self::locate(headers, name)),
        })
    }
}

/// Parses a spreadsheet amount: `$`, `,` and whitespace are ignored,
/// `(12.50)` is negative and an empty cell is zero.
pub fn parse_amount(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Ok(0.0);
    }

    let (negative, digits) = match cleaned
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    let value: f64 = digits
        .parse()
        .map_err(|_| AgingError::InvalidAmount(raw.to_string()))?;
    if !value.is_finite() {
        return Err(AgingError::InvalidAmount(raw.to_string()));
    }
    Ok(if negative { -value } else { value })
}

const FOOTER_LABELS: [&str; 3] = ["total", "totals", "grand total"];

fn is_footer_label(description: &str) -> bool {
    let lowered = description.trim().to_lowercase();
    FOOTER_LABELS.contains(&lowered.as_str())
}

fn cell<'r>(record: &'r StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("")
}

/// Reads one month of aging rows from CSV. Blank descriptions and footer
/// lines labelled "Total", "Totals" or "Grand Total" are skipped.
pub fn read_month_csv<R: Read>(
    reader: R,
    month: &str,
    mapping: &ColumnMapping,
) -> Result<Vec<AgingRow>> {
    parse_month(month)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let columns = mapping.resolve(&headers)?;

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let description = cell(&record, columns.description).trim();
        if description.is_empty() {
            debug!("Skipping row without a client description: {:?}", record);
            continue;
        }
        if is_footer_label(description) {
            debug!("Skipping footer row: {:?}", record);
            continue;
        }

        let total = match columns.total.map(|i| cell(&record, i)) {
            Some(raw) if !raw.trim().is_empty() => Some(parse_amount(raw)?),
            _ => None,
        };

        rows.push(AgingRow {
            month: month.to_string(),
            description: description.to_string(),
            days_0_30: parse_amount(cell(&record, columns.days_0_30))?,
            days_31_60: parse_amount(cell(&record, columns.days_31_60))?,
            days_61_90: parse_amount(cell(&record, columns.days_61_90))?,
            days_90_plus: parse_amount(cell(&record, columns.days_90_plus))?,
            total,
            predicted: false,
        });
    }

    info!("Read {} aging rows for {}", rows.len(), month);
    Ok(rows)
}

pub fn read_month_csv_path(
    path: impl AsRef<Path>,
    month: &str,
    mapping: &ColumnMapping,
) -> Result<Vec<AgingRow>> {
    let file = std::fs::File::open(path)?;
    read_month_csv(file, month, mapping)
}
