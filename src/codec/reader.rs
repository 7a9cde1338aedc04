//! Stream-level HTTP/1.x decoder.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{decode_latin1, CodecLimits, ProtocolError};
use crate::message::{HttpHeaders, RequestLine, StatusLine};

/// Initial capacity for bodies whose size is not known up front.
const BODY_CHUNK: usize = 64 * 1024;

/// Decodes HTTP/1.x framing from a buffered byte stream.
///
/// The reader holds no state of its own; all buffering lives in the
/// underlying `AsyncBufRead`, so short-lived readers can be created per call.
pub struct HttpReader<R> {
    inner: R,
    limits: CodecLimits,
}

impl<R: AsyncBufRead + Unpin> HttpReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limits(inner, CodecLimits::default())
    }

    pub fn with_limits(inner: R, limits: CodecLimits) -> Self {
        Self { inner, limits }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read one CRLF-terminated line, without its terminator.
    ///
    /// A lone CR or LF is kept as data. Bytes map one-to-one onto
    /// ISO-8859-1 characters so non-ASCII field values survive a write back.
    /// Returns `None` when the stream ends before a terminator is seen.
    pub async fn read_line(&mut self) -> Result<Option<String>, ProtocolError> {
        let mut line: Vec<u8> = Vec::with_capacity(128);

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(None);
            }

            let (consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(index) => {
                    line.extend_from_slice(&available[..=index]);
                    (index + 1, line.ends_with(b"\r\n"))
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), false)
                }
            };
            self.inner.consume(consumed);

            if complete {
                line.truncate(line.len() - 2);
            }

            // an unfinished line may still end in the CR of its terminator
            let content = if complete {
                line.len()
            } else {
                line.len().saturating_sub(1)
            };
            if content > self.limits.max_line_bytes {
                return Err(ProtocolError::LineTooLong {
                    limit: self.limits.max_line_bytes,
                });
            }

            if complete {
                return Ok(Some(decode_latin1(&line)));
            }
        }
    }

    /// Read the next request line, skipping stray blank lines between messages.
    pub async fn read_request_line(&mut self) -> Result<Option<RequestLine>, ProtocolError> {
        loop {
            match self.read_line().await? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => return RequestLine::parse(&line).map(Some),
            }
        }
    }

    pub async fn read_status_line(&mut self) -> Result<Option<StatusLine>, ProtocolError> {
        match self.read_line().await? {
            None => Ok(None),
            Some(line) => StatusLine::parse(&line).map(Some),
        }
    }

    /// Read header fields up to the blank line that ends the block.
    pub async fn read_headers(&mut self) -> Result<HttpHeaders, ProtocolError> {
        let mut headers = HttpHeaders::new();
        let mut count = 0usize;

        while let Some(line) = self.read_line().await? {
            if line.is_empty() {
                break;
            }

            count += 1;
            if count > self.limits.max_headers {
                return Err(ProtocolError::TooManyHeaders {
                    limit: self.limits.max_headers,
                });
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::InvalidHeader(line.clone()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ProtocolError::InvalidHeader(line));
            }
            headers.add(name, value.trim());
        }

        Ok(headers)
    }

    /// Read up to `length` bytes; a stream that ends early yields what arrived.
    pub async fn read_body(&mut self, length: u64) -> Result<Vec<u8>, ProtocolError> {
        let limit = self.limits.max_body_bytes;
        if length > limit as u64 {
            return Err(ProtocolError::BodyTooLarge { limit });
        }

        let mut body = Vec::with_capacity((length as usize).min(BODY_CHUNK));
        (&mut self.inner).take(length).read_to_end(&mut body).await?;
        Ok(body)
    }

    /// Decode a chunked body, discarding any trailer fields.
    pub async fn read_chunked_body(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let limit = self.limits.max_body_bytes;
        let mut body = Vec::new();

        loop {
            let Some(line) = self.read_line().await? else {
                return Err(unexpected_eof("chunk size line"));
            };

            let size_text = line.split_once(';').map_or(line.as_str(), |(size, _)| size);
            let size = usize::from_str_radix(size_text.trim(), 16)
                .map_err(|_| ProtocolError::InvalidChunkSize(line.clone()))?;

            if size == 0 {
                self.skip_trailers().await?;
                return Ok(body);
            }

            if body.len().saturating_add(size) > limit {
                return Err(ProtocolError::BodyTooLarge { limit });
            }

            let start = body.len();
            body.resize(start + size, 0);
            self.inner.read_exact(&mut body[start..]).await?;

            // CRLF after the chunk data
            self.read_line().await?;
        }
    }

    /// Read until the peer stops sending.
    pub async fn read_body_to_end(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let limit = self.limits.max_body_bytes;
        let mut body = Vec::with_capacity(BODY_CHUNK);
        (&mut self.inner)
            .take(limit as u64 + 1)
            .read_to_end(&mut body)
            .await?;

        if body.len() > limit {
            return Err(ProtocolError::BodyTooLarge { limit });
        }
        Ok(body)
    }

    async fn skip_trailers(&mut self) -> Result<(), ProtocolError> {
        while let Some(line) = self.read_line().await? {
            if line.is_empty() {
                break;
            }
            tracing::trace!(trailer = %line, "Discarding chunked trailer");
        }
        Ok(())
    }
}

fn unexpected_eof(what: &str) -> ProtocolError {
    ProtocolError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("stream ended before {what}"),
    ))
}
