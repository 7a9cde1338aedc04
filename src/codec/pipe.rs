//! Connection byte stream with its buffered reader and writer.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};

use super::{CodecLimits, HttpReader, HttpWriter};

/// Any duplex byte stream the proxy can speak HTTP over.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProxyStream for T {}

pub type BoxedStream = Box<dyn ProxyStream>;

/// One stream plus the reader and writer bound to it.
///
/// Reads go through a `BufReader`; writes pass straight through to the
/// stream. TLS promotion consumes the pipe via [`Pipe::into_stream`] and a
/// new pipe is built around the encrypted stream.
pub struct Pipe {
    io: BufReader<BoxedStream>,
    limits: CodecLimits,
}

impl Pipe {
    pub fn new<S: ProxyStream + 'static>(stream: S, limits: CodecLimits) -> Self {
        Self::from_boxed(Box::new(stream), limits)
    }

    pub fn from_boxed(stream: BoxedStream, limits: CodecLimits) -> Self {
        Self {
            io: BufReader::new(stream),
            limits,
        }
    }

    pub fn reader(&mut self) -> HttpReader<&mut BufReader<BoxedStream>> {
        HttpReader::with_limits(&mut self.io, self.limits)
    }

    pub fn writer(&mut self) -> HttpWriter<&mut BufReader<BoxedStream>> {
        HttpWriter::new(&mut self.io)
    }

    pub fn limits(&self) -> CodecLimits {
        self.limits
    }

    /// Unwrap the raw stream, replaying bytes that were already buffered.
    pub fn into_stream(self) -> BoxedStream {
        let buffered = self.io.buffer().to_vec();
        let stream = self.io.into_inner();
        if buffered.is_empty() {
            stream
        } else {
            Box::new(Rewind::new(buffered, stream))
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }
}

/// Stream that yields a prefix before reading from the wrapped stream.
struct Rewind {
    prefix: Vec<u8>,
    position: usize,
    inner: BoxedStream,
}

impl Rewind {
    fn new(prefix: Vec<u8>, inner: BoxedStream) -> Self {
        Self {
            prefix,
            position: 0,
            inner,
        }
    }
}

impl AsyncRead for Rewind {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.position < this.prefix.len() {
            let remaining = &this.prefix[this.position..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.position += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Rewind {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
