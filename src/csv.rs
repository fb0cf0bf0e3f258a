use crate::{ImportError, ImportResult};
use csv_async::{AsyncReaderBuilder, StringRecord, Trim};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Header row plus data rows, every row padded to the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    /// Header text as written in the file (trimmed).
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ParsedCsv {
    /// Normalized lookup keys, index-aligned with `headers`.
    pub fn header_keys(&self) -> Vec<String> {
        self.headers.iter().map(|h| header_key(h)).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Lookup form of a header: lowercase, inner whitespace runs collapsed to `_`.
pub fn header_key(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Parse CSV text. Quoted fields may contain commas, `""` escapes and newlines.
pub async fn parse_csv(text: &str) -> ImportResult<ParsedCsv> {
    parse_bytes(text.as_bytes()).await
}

/// Parse CSV from any UTF-8 reader (see `build_text_reader` for compressed or
/// non-UTF-8 sources). The whole input is buffered.
pub async fn parse_reader<R>(mut reader: R) -> ImportResult<ParsedCsv>
where
    R: AsyncRead + Unpin + Send,
{
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).await?;
    parse_bytes(&bytes).await
}

/// Headers are trimmed. Data fields are trimmed only when they were not quoted in
/// the source, so `"  padded  "` keeps its spaces.
async fn parse_bytes(bytes: &[u8]) -> ImportResult<ParsedCsv> {
    let mut rdr = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .create_reader(bytes);

    let headers: Vec<String> = rdr
        .headers()
        .await
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ImportError::MalformedCsv("file is empty".into()));
    }

    let width = headers.len();
    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record).await.map_err(malformed)? {
        let row_number = rows.len() + 1;
        let start = record
            .position()
            .map_or(0, |p| p.byte() as usize)
            .min(bytes.len());
        let quoted = quoted_fields(&bytes[start..]);

        let mut fields: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if quoted.get(i).copied().unwrap_or(false) {
                    field.to_string()
                } else {
                    field.trim().to_string()
                }
            })
            .collect();

        if fields.len() > width {
            if fields[width..].iter().any(|f| !f.is_empty()) {
                return Err(ImportError::MalformedCsv(format!(
                    "row {row_number} has {} fields but the header has {width}",
                    fields.len()
                )));
            }
            fields.truncate(width);
        }
        fields.resize(width, String::new());
        rows.push(fields);
    }

    if rows.is_empty() {
        return Err(ImportError::MalformedCsv(
            "CSV file must contain a header row and at least one data row".into(),
        ));
    }

    Ok(ParsedCsv { headers, rows })
}

/// For the record starting at `raw`, which fields open with a quote.
///
/// A record's reported position can sit before the line terminators the reader
/// skips, so leading `\r`/`\n` bytes are ignored.
fn quoted_fields(raw: &[u8]) -> Vec<bool> {
    let mut i = raw
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .unwrap_or(raw.len());
    let mut flags = Vec::new();
    loop {
        let quoted = raw.get(i) == Some(&b'"');
        flags.push(quoted);
        if quoted {
            i += 1;
            while i < raw.len() {
                if raw[i] == b'"' {
                    if raw.get(i + 1) == Some(&b'"') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
        }
        while i < raw.len() && !matches!(raw[i], b',' | b'\r' | b'\n') {
            i += 1;
        }
        if raw.get(i) != Some(&b',') {
            return flags;
        }
        i += 1;
    }
}

fn malformed(err: csv_async::Error) -> ImportError {
    ImportError::MalformedCsv(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{header_key, quoted_fields};

    #[test]
    fn header_keys_fold_case_and_spaces() {
        assert_eq!(header_key("Target Value"), "target_value");
        assert_eq!(header_key("  Due   Date "), "due_date");
        assert_eq!(header_key("NAME"), "name");
    }

    #[test]
    fn finds_quoted_fields_in_a_raw_record() {
        assert_eq!(quoted_fields(b"a,\"b,c\",d\n"), vec![false, true, false]);
        assert_eq!(quoted_fields(b"\n\"x\"\"y\", z\r\nnext"), vec![true, false]);
        assert_eq!(quoted_fields(b"\"multi\nline\",\n"), vec![true, false]);
        assert_eq!(quoted_fields(b""), vec![false]);
    }
}
