use crate::codec::Utf8Transcoder;
use crate::{ImportError, ImportResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// e.g. "application/gzip" or "text/csv; charset=windows-1252"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// original upload file name (used for extension fallback and the job record)
    pub file_name: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            file_name: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl SourceMeta {
    pub fn for_file_name(name: impl Into<String>) -> Self {
        let file_name = name.into();
        let lower = file_name.to_ascii_lowercase();
        let (content_type, content_encoding) = if lower.ends_with(".gz") {
            ("application/gzip", "gzip")
        } else if lower.ends_with(".zst") {
            ("application/zstd", "zstd")
        } else {
            ("text/csv", "")
        };
        Self {
            content_type: content_type.into(),
            content_encoding: content_encoding.into(),
            file_name,
            ..Default::default()
        }
    }

    /// Charset from a `charset=` content-type parameter, falling back to `self.charset`.
    fn effective_charset(&self) -> &'static encoding_rs::Encoding {
        self.content_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("charset="))
            .find_map(|label| encoding_rs::Encoding::for_label(label.trim_matches('"').as_bytes()))
            .unwrap_or(self.charset)
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || ct.starts_with("application/gzip")
            || ct.starts_with("application/x-gzip")
            || self.file_name.to_ascii_lowercase().ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.to_ascii_lowercase().starts_with("application/zstd")
            || self.file_name.to_ascii_lowercase().ends_with(".zst")
    }
}

/// What the pipeline records about an upload once it has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub file_name: String,
    /// Size of the decoded UTF-8 text.
    pub byte_size: usize,
    /// CRC32 of the decoded text.
    pub checksum: u32,
}

/// Wrap a raw upload with optional decompression and transcoding to UTF-8.
pub fn build_text_reader<R>(raw: R, meta: &SourceMeta) -> Box<dyn AsyncRead + Unpin + Send>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(64 * 1024, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    let charset = meta.effective_charset();
    if charset == encoding_rs::UTF_8 {
        // validated once the whole text is in memory
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(charset));
        Box::new(StreamReader::new(framed))
    }
}

/// Read a whole upload into text, bounded by `max_bytes` of decoded output.
pub async fn read_source<R>(
    raw: R,
    meta: &SourceMeta,
    max_bytes: usize,
) -> ImportResult<(String, SourceInfo)>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let reader = build_text_reader(raw, meta);
    let mut bytes = Vec::new();
    reader
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut bytes)
        .await?;

    if bytes.len() > max_bytes {
        return Err(ImportError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let mut text = String::from_utf8(bytes)
        .map_err(|e| ImportError::MalformedCsv(format!("file is not valid UTF-8: {e}")))?;
    if text.starts_with('\u{FEFF}') {
        text.drain(..'\u{FEFF}'.len_utf8());
    }

    let info = SourceInfo {
        file_name: meta.file_name.clone(),
        byte_size: text.len(),
        checksum: crc32fast::hash(text.as_bytes()),
    };
    debug!(file = %info.file_name, bytes = info.byte_size, "source decoded");
    Ok((text, info))
}

/// Open a local upload; compression is inferred from the extension.
pub async fn reader_from_path(path: &Path) -> ImportResult<(File, SourceMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok((file, SourceMeta::for_file_name(name)))
}
