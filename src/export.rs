use crate::aggregator::aggregate;
use crate::error::{AgingError, Result};
use crate::schema::{AgingBucket, AgingValues, Described, ForecastRow, MonthlySnapshot};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fmt::Write as _;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    /// HTML table served with an `.xls` extension; spreadsheet apps open it directly.
    Excel,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xls",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8;",
            ExportFormat::Excel => "application/vnd.ms-excel",
        }
    }
}

/// `{client}_{month}_AR_Aging.{ext}`. Path separators in the client name are
/// replaced so the name stays a single path component.
pub fn export_filename(client_name: &str, month: &str, format: ExportFormat) -> String {
    let client: String = client_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}_{}_AR_Aging.{}", client, month, format.extension())
}

fn header_row() -> Vec<&'static str> {
    std::iter::once("Description")
        .chain(AgingBucket::ALL.into_iter().map(AgingBucket::label))
        .collect()
}

fn value_row<T: AgingValues>(label: &str, values: &T) -> Vec<String> {
    std::iter::once(label.to_string())
        .chain(
            AgingBucket::ALL
                .into_iter()
                .map(|bucket| values.bucket_value(bucket).to_string()),
        )
        .collect()
}

fn write_table<W, T>(writer: W, rows: &[T], footer: &str, quote: QuoteStyle) -> Result<()>
where
    W: Write,
    T: AgingValues + Described,
{
    let mut csv_writer = WriterBuilder::new()
        .quote_style(quote)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer.write_record(header_row())?;
    for row in rows {
        csv_writer.write_record(value_row(row.description(), row))?;
    }
    csv_writer.write_record(value_row(footer, &aggregate(rows)))?;
    csv_writer.flush()?;
    Ok(())
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| AgingError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// One month of history as CSV: every field quoted, `TOTALS` footer.
pub fn write_snapshot_csv<W: Write>(writer: W, snapshot: &MonthlySnapshot) -> Result<()> {
    write_table(writer, &snapshot.records, "TOTALS", QuoteStyle::Always)
}

pub fn snapshot_csv(snapshot: &MonthlySnapshot) -> Result<String> {
    let mut buffer = Vec::new();
    write_snapshot_csv(&mut buffer, snapshot)?;
    into_string(buffer)
}

/// Forecast rows as CSV with a `Total` footer. `Current` falls back to
/// `0-30` for rows that carry no current value.
pub fn write_forecast_csv<W: Write>(writer: W, rows: &[ForecastRow]) -> Result<()> {
    write_table(writer, rows, "Total", QuoteStyle::Necessary)
}

pub fn forecast_csv(rows: &[ForecastRow]) -> Result<String> {
    let mut buffer = Vec::new();
    write_forecast_csv(&mut buffer, rows)?;
    into_string(buffer)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_cells<T: AgingValues>(html: &mut String, label: &str, values: &T) {
    let _ = write!(html, "<td>{}</td>", escape_html(label));
    for bucket in AgingBucket::ALL {
        let _ = write!(html, "<td>{}</td>", values.bucket_value(bucket));
    }
}

/// Forecast rows as an HTML table with a bold `Total` row.
pub fn forecast_html_table(rows: &[ForecastRow]) -> String {
    let mut html = String::from("<table>\n<thead>\n<tr>");
    for header in header_row() {
        let _ = write!(html, "<th>{}</th>", header);
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");

    for row in rows {
        html.push_str("<tr>");
        push_cells(&mut html, &row.description, row);
        html.push_str("</tr>\n");
    }

    html.push_str("<tr style=\"font-weight: bold; border-top: 2px solid #000;\">");
    push_cells(&mut html, "Total", &aggregate(rows));
    html.push_str("</tr>\n</tbody>\n</table>\n");
    html
}
