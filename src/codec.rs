use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Incremental charset-to-UTF-8 decoder for `FramedRead`.
///
/// Malformed sequences are replaced with U+FFFD and logged once at end of input.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    replaced: bool,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            // BOM sniffing is on: a BOM overrides `encoding` and is dropped from the output
            decoder: encoding.new_decoder(),
            replaced: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<Bytes> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3 + 16);
        let mut out = vec![0u8; capacity];

        let (_result, read, written, had_errors) = self.decoder.decode_to_utf8(src, &mut out, last);
        self.replaced |= had_errors;
        src.advance(read);

        if written == 0 {
            return None;
        }
        out.truncate(written);
        Some(Bytes::from(out))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // A trailing partial sequence stays buffered inside the decoder, so an empty
        // chunk here only means "need more input".
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let out = self.transcode(buf, true);
        buf.clear();
        if self.replaced {
            warn!(
                encoding = self.decoder.encoding().name(),
                "malformed input replaced with U+FFFD"
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_latin1_across_chunks() {
        let mut t = Utf8Transcoder::new(encoding_rs::WINDOWS_1252);
        let mut first = BytesMut::from(&b"caf"[..]);
        let mut second = BytesMut::from(&[0xE9u8][..]);

        let a = t.decode(&mut first).unwrap().unwrap();
        let b = t.decode_eof(&mut second).unwrap().unwrap();

        let text = String::from_utf8([a, b].concat()).unwrap();
        assert_eq!(text, "café");
        assert!(!t.replaced);
    }

    #[test]
    fn flags_invalid_utf8_as_replaced() {
        let mut t = Utf8Transcoder::new(encoding_rs::UTF_8);
        let mut src = BytesMut::from(&[b'a', 0xFF, b'b'][..]);
        let out = t.decode_eof(&mut src).unwrap().unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), "a\u{FFFD}b");
        assert!(t.replaced);
    }
}
