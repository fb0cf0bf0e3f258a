use crate::kind::KindRegistry;
use crate::store::{Pagination, RecordStore};
use crate::{ImportError, ImportResult};
use bytes::Bytes;
use chrono::NaiveDate;
use csv_async::{AsyncWriterBuilder, QuoteStyle, Terminator};
use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::info;

const ID_KEY: &str = "id";
const PAGE_SIZE: usize = 500;

/// A finished export, ready to be offered as a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: Bytes,
}

/// `<kind>_<YYYY-MM-DD>.csv`
pub fn export_filename(kind: &str, date: NaiveDate) -> String {
    format!("{kind}_{}.csv", date.format("%Y-%m-%d"))
}

fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Quote a field holding a delimiter, quote or line break, or one with leading or
/// trailing whitespace (which the parser would otherwise trim away).
fn quote(field: &str) -> Cow<'_, str> {
    let padded = field.starts_with(char::is_whitespace) || field.ends_with(char::is_whitespace);
    if padded || field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Serialize records as CSV. Columns are the first record's keys in insertion order,
/// without `id`.
pub async fn to_csv(records: &[Map<String, Value>]) -> ImportResult<String> {
    let Some(first) = records.first() else {
        return Ok(String::new());
    };
    let columns: Vec<&str> = first
        .keys()
        .map(String::as_str)
        .filter(|k| *k != ID_KEY)
        .collect();

    // fields arrive already quoted
    let mut wtr = AsyncWriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .create_writer(Vec::new());

    let header: Vec<Cow<'_, str>> = columns.iter().map(|c| quote(c)).collect();
    wtr.write_record(header.iter().map(|f| f.as_bytes())).await?;
    for record in records {
        let fields: Vec<String> = columns.iter().map(|c| render(record.get(*c))).collect();
        let mut quoted: Vec<Cow<'_, str>> = fields.iter().map(|f| quote(f)).collect();
        // a lone empty field would otherwise be a blank line, which readers skip
        if let [only] = quoted.as_mut_slice() {
            if only.is_empty() {
                *only = Cow::Borrowed("\"\"");
            }
        }
        wtr.write_record(quoted.iter().map(|f| f.as_bytes())).await?;
    }

    let bytes = wtr
        .into_inner()
        .await
        .map_err(|e| ImportError::System(format!("flushing CSV export failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ImportError::System(e.to_string()))
}

/// Page through a kind's table and format it as a dated CSV artifact.
pub async fn export_table<S>(
    store: &S,
    registry: &KindRegistry,
    kind: &str,
    filters: &Map<String, Value>,
    date: NaiveDate,
) -> ImportResult<ExportArtifact>
where
    S: RecordStore + ?Sized,
{
    let spec = registry.get(kind)?;
    let mut records = Vec::new();
    let mut page = Pagination::first(PAGE_SIZE);
    loop {
        let batch = store.fetch_data(spec.table, page, filters).await?;
        let done = batch.len() < page.limit;
        records.extend(batch.into_iter().filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        }));
        if done {
            break;
        }
        page = page.next();
    }

    let body = to_csv(&records).await?;
    info!(kind, records = records.len(), bytes = body.len(), "export built");
    Ok(ExportArtifact {
        file_name: export_filename(kind, date),
        content_type: "text/csv",
        body: Bytes::from(body),
    })
}
