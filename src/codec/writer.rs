//! Stream-level HTTP/1.x encoder.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::encode_latin1;
use crate::message::{HttpHeaders, RequestLine, StatusLine};

const CRLF: &[u8] = b"\r\n";

/// Encodes HTTP/1.x framing onto a byte stream.
pub struct HttpWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> HttpWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub async fn write_request_line(&mut self, line: &RequestLine) -> io::Result<()> {
        self.write_line(&line.to_string()).await
    }

    pub async fn write_status_line(&mut self, line: &StatusLine) -> io::Result<()> {
        self.write_line(&line.to_string()).await
    }

    /// Write every field, the blank separator line, then flush.
    pub async fn write_headers(&mut self, headers: &HttpHeaders) -> io::Result<()> {
        let mut block = Vec::with_capacity(headers.len() * 32 + 2);
        for (name, value) in headers.iter() {
            encode_latin1(name, &mut block);
            block.extend_from_slice(b": ");
            encode_latin1(value, &mut block);
            block.extend_from_slice(CRLF);
        }
        block.extend_from_slice(CRLF);

        self.inner.write_all(&block).await?;
        self.inner.flush().await
    }

    /// Write raw body bytes. The trailing flush is best-effort.
    pub async fn write_body(&mut self, body: &[u8]) -> io::Result<()> {
        if !body.is_empty() {
            self.inner.write_all(body).await?;
        }
        if let Err(e) = self.inner.flush().await {
            tracing::trace!(error = %e, "Flush after body failed");
        }
        Ok(())
    }

    /// Encode `chunks` with chunked transfer coding, followed by the last-chunk.
    ///
    /// Empty chunks are skipped since a zero-size chunk terminates the body.
    pub async fn write_chunked_body<'a, I>(&mut self, chunks: I) -> io::Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for chunk in chunks.into_iter().filter(|c| !c.is_empty()) {
            self.inner
                .write_all(format!("{:X}\r\n", chunk.len()).as_bytes())
                .await?;
            self.inner.write_all(chunk).await?;
            self.inner.write_all(CRLF).await?;
        }
        self.inner.write_all(b"0\r\n\r\n").await?;
        self.inner.flush().await
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        encode_latin1(line, &mut buf);
        buf.extend_from_slice(CRLF);
        self.inner.write_all(&buf).await
    }
}
