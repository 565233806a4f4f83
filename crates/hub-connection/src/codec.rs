//! Inbound line framing.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Splits inbound bytes on `\n` and decodes every line lossily.
///
/// Invalid UTF-8 becomes U+FFFD. A line longer than `max_length` is skipped
/// up to its terminator and decoding carries on with the next line, so the
/// only errors this decoder yields come from the transport.
#[derive(Debug)]
pub(crate) struct LineDecoder {
    max_length: usize,
    /// Bytes of the buffer already searched for a terminator.
    next_index: usize,
    /// Inside an over-long line, dropping bytes until its terminator.
    discarding: bool,
}

impl LineDecoder {
    pub(crate) fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') else {
                if self.discarding {
                    buf.clear();
                    self.next_index = 0;
                } else if buf.len() > self.max_length {
                    warn!(max = self.max_length, "dropping over-long line");
                    self.discarding = true;
                    buf.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = buf.len();
                }
                return Ok(None);
            };

            let end = self.next_index + offset;
            let line = buf.split_to(end + 1);
            self.next_index = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if end > self.max_length {
                warn!(length = end, max = self.max_length, "dropping over-long line");
                continue;
            }
            return Ok(Some(to_line(&line[..end])));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() || self.discarding {
            buf.clear();
            self.discarding = false;
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        Ok(Some(to_line(&line)))
    }
}
