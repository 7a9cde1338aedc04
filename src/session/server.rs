//! Origin side of a session.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::codec::{BoxedStream, CodecLimits, Pipe};
use crate::error::ProxyError;
use crate::message::{DnsEndPoint, HttpHeaders, Request, Response};
use crate::net::Resolve;
use crate::tls::TlsProvider;

/// Headers addressed to the proxy itself, never forwarded.
const PROXY_ONLY_HEADERS: [&str; 2] = ["Proxy-Connection", "Proxy-Authorization"];

/// Writes requests to the origin and reads its responses.
pub struct ServerHandler {
    pipe: Pipe,
    endpoint: DnsEndPoint,
    exhausted: bool,
}

impl ServerHandler {
    /// Resolve `endpoint` and connect to each address in turn until one answers.
    pub async fn connect(
        endpoint: &DnsEndPoint,
        resolver: &dyn Resolve,
        connect_timeout: Duration,
        limits: CodecLimits,
    ) -> Result<Self, ProxyError> {
        let addresses = resolver
            .resolve(endpoint.host())
            .await
            .map_err(|source| ProxyError::Resolve {
                host: endpoint.host().to_string(),
                source,
            })?;

        let mut last_error = None;
        let mut timed_out = false;
        for ip in addresses {
            let addr = SocketAddr::new(ip, endpoint.port());
            match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::trace!(error = %e, "Could not disable Nagle on origin socket");
                    }
                    tracing::debug!(target = %endpoint, address = %addr, "Connected to origin");
                    return Ok(Self {
                        pipe: Pipe::new(stream, limits),
                        endpoint: endpoint.clone(),
                        exhausted: false,
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!(address = %addr, error = %e, "Origin connect attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    tracing::debug!(address = %addr, "Origin connect attempt timed out");
                    timed_out = true;
                }
            }
        }

        if timed_out && last_error.is_none() {
            return Err(ProxyError::Timeout {
                operation: "origin connect",
                after: connect_timeout,
            });
        }
        Err(ProxyError::Connect {
            endpoint: endpoint.to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")),
        })
    }

    pub fn endpoint(&self) -> &DnsEndPoint {
        &self.endpoint
    }

    /// The origin has closed its side; the connection cannot be reused.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Forward `request` in origin form without proxy-only headers.
    pub async fn send_request(&mut self, request: &Request) -> Result<(), ProxyError> {
        let line = request.line().origin_form();
        let headers = forwarded_headers(request.headers());

        let mut writer = self.pipe.writer();
        writer.write_request_line(&line).await?;
        writer.write_headers(&headers).await?;
        writer.write_body(request.body()).await?;
        Ok(())
    }

    /// Read the response to a request made with `verb`.
    ///
    /// Chunked and close-delimited bodies are buffered in full and re-framed
    /// with `Content-Length`. `None` when the origin closed without answering.
    pub async fn receive_response(&mut self, verb: &str) -> Result<Option<Response>, ProxyError> {
        let Some(line) = self.pipe.reader().read_status_line().await? else {
            return Ok(None);
        };
        let headers = self.pipe.reader().read_headers().await?;
        let mut response = Response::new(line, headers);

        if response.has_body_for(verb) {
            if response.is_chunked() {
                let body = self.pipe.reader().read_chunked_body().await?;
                response.set_decoded_body(body);
            } else if let Some(length) = response.headers().content_length() {
                if length > 0 {
                    let body = self.pipe.reader().read_body(length).await?;
                    response.set_body(body);
                }
            } else {
                let body = self.pipe.reader().read_body_to_end().await?;
                self.exhausted = true;
                response.set_decoded_body(body);
            }
        }

        Ok(Some(response))
    }

    /// Client-role handshake validating the origin as `host`.
    pub async fn connect_tls(self, tls: &TlsProvider, host: &str) -> Result<Self, ProxyError> {
        let limits = self.pipe.limits();
        let stream = tls.connect(self.pipe.into_stream(), host).await?;
        Ok(Self {
            pipe: Pipe::from_boxed(stream, limits),
            endpoint: self.endpoint,
            exhausted: false,
        })
    }

    pub fn into_stream(self) -> BoxedStream {
        self.pipe.into_stream()
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.pipe.shutdown().await {
            tracing::trace!(error = %e, "Origin shutdown failed");
        }
    }
}

fn forwarded_headers(headers: &HttpHeaders) -> HttpHeaders {
    let mut forwarded = headers.clone();
    for name in PROXY_ONLY_HEADERS {
        forwarded.remove(name);
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::CachingResolver;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn origin(reply: &'static [u8]) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            received
        });
        (addr, handle)
    }

    fn endpoint(addr: SocketAddr) -> DnsEndPoint {
        DnsEndPoint::new(addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_forwards_origin_form_and_dechunks() {
        let (addr, origin) =
            origin(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n").await;

        let mut server = ServerHandler::connect(
            &endpoint(addr),
            &CachingResolver::new(),
            Duration::from_secs(2),
            CodecLimits::default(),
        )
        .await
        .unwrap();

        let uri = format!("http://{addr}/path?q=1");
        let line = crate::message::RequestLine::parse(&format!("GET {uri} HTTP/1.1")).unwrap();
        let headers: HttpHeaders = [
            ("Host", addr.to_string()),
            ("Proxy-Connection", "keep-alive".to_string()),
        ]
        .into_iter()
        .collect();
        server.send_request(&Request::new(line, headers)).await.unwrap();

        let response = server.receive_response("GET").await.unwrap().unwrap();
        assert_eq!(response.body(), b"hello");
        assert!(!response.is_chunked());
        assert_eq!(response.headers().content_length(), Some(5));

        let received = String::from_utf8(origin.await.unwrap()).unwrap();
        assert!(received.starts_with("GET /path?q=1 HTTP/1.1\r\n"));
        assert!(!received.contains("Proxy-Connection"));
    }

    #[tokio::test]
    async fn test_close_delimited_body_gets_length() {
        let (addr, _origin) = origin(b"HTTP/1.0 200 OK\r\n\r\nuntil close").await;
        let mut server = ServerHandler::connect(
            &endpoint(addr),
            &CachingResolver::new(),
            Duration::from_secs(2),
            CodecLimits::default(),
        )
        .await
        .unwrap();

        let line = crate::message::RequestLine::parse("GET / HTTP/1.0").unwrap();
        server.send_request(&Request::new(line, HttpHeaders::new())).await.unwrap();

        let response = server.receive_response("GET").await.unwrap().unwrap();
        assert_eq!(response.body(), b"until close");
        assert_eq!(response.headers().content_length(), Some(11));
        assert!(server.is_exhausted());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = ServerHandler::connect(
            &endpoint(addr),
            &CachingResolver::new(),
            Duration::from_secs(2),
            CodecLimits::default(),
        )
        .await;
        assert!(matches!(result, Err(ProxyError::Connect { .. })));
    }
}
