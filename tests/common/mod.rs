//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use intercept_proxy::codec::{HttpReader, ProtocolError};
use intercept_proxy::config::ListenerConfig;
use intercept_proxy::lifecycle::Shutdown;
use intercept_proxy::message::{HttpHeaders, StatusLine};
use intercept_proxy::net::Listener;
use intercept_proxy::tls::{
    CertificateAuthority, InterceptionPolicy, IssueCertificate, TlsProvider,
};
use intercept_proxy::{ProxyContext, ProxyServer};
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve HTTP/1.1 on `stream`, answering each request with
/// `"<verb> <uri>"` plus `":<body>"` when the request carried one.
async fn serve_origin_connection<S>(stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut io = BufReader::new(stream);
    loop {
        let mut reader = HttpReader::new(&mut io);
        let Ok(Some(line)) = reader.read_request_line().await else {
            break;
        };
        let Ok(headers) = reader.read_headers().await else {
            break;
        };
        let body = match headers.content_length() {
            Some(length) if length > 0 => reader.read_body(length).await.unwrap_or_default(),
            _ => Vec::new(),
        };

        let mut reply = format!("{} {}", line.verb(), line.uri());
        if !body.is_empty() {
            reply.push(':');
            reply.push_str(&String::from_utf8_lossy(&body));
        }
        let close = headers.has_token("Connection", "close");
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Request-Host: {}\r\n{}\r\n{}",
            reply.len(),
            headers.host().unwrap_or("-"),
            if close { "Connection: close\r\n" } else { "" },
            reply
        );
        if io.get_mut().write_all(response.as_bytes()).await.is_err() || close {
            break;
        }
    }
    let _ = io.get_mut().shutdown().await;
}

/// Plain HTTP origin on an ephemeral port.
pub async fn start_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_origin_connection(socket));
        }
    });
    addr
}

/// HTTPS origin for `localhost`, signed by its own CA.
pub struct TlsOrigin {
    pub addr: SocketAddr,
    pub ca: CertificateDer<'static>,
}

pub async fn start_tls_origin() -> TlsOrigin {
    let authority = CertificateAuthority::generate("Origin Test Root").unwrap();
    let certificate = authority.issue_or_fetch("localhost").unwrap();
    let tls = TlsProvider::new(Vec::new(), TIMEOUT).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tls = tls.clone();
            let certificate = Arc::clone(&certificate);
            tokio::spawn(async move {
                if let Ok(stream) = tls.accept(Box::new(socket), &certificate).await {
                    serve_origin_connection(stream).await;
                }
            });
        }
    });

    TlsOrigin {
        addr,
        ca: authority.ca_der().clone(),
    }
}

/// A proxy running on an ephemeral port until dropped.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub ctx: Arc<ProxyContext>,
    pub authority: Arc<CertificateAuthority>,
    shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The CA certificate clients must trust for intercepted hosts.
    pub fn ca(&self) -> CertificateDer<'static> {
        self.authority.ca_der().clone()
    }

    /// reqwest client sending every request through the proxy.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .proxy(reqwest::Proxy::http(self.url()).unwrap())
            .timeout(TIMEOUT)
            .build()
            .unwrap()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(
    policy: InterceptionPolicy,
    upstream_roots: Vec<CertificateDer<'static>>,
) -> TestProxy {
    let listener = Listener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        max_connections: 64,
    })
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    let authority = Arc::new(CertificateAuthority::generate("Proxy Test Root").unwrap());
    let tls = TlsProvider::new(upstream_roots, TIMEOUT).unwrap();
    let ctx = Arc::new(
        ProxyContext::new(authority.clone(), tls)
            .with_policy(policy)
            .with_connect_timeout(TIMEOUT)
            .with_listen_port(addr.port()),
    );

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    let server = ProxyServer::new(Arc::clone(&ctx));
    tokio::spawn(async move {
        let _ = server.run(listener, stop, Duration::from_millis(100)).await;
    });

    TestProxy {
        addr,
        ctx,
        authority,
        shutdown,
    }
}

/// Read one response with a `Content-Length` framed (or empty) body.
pub async fn read_response<R>(reader: &mut R) -> Result<(StatusLine, HttpHeaders, Vec<u8>), ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = HttpReader::new(reader);
    let line = reader
        .read_status_line()
        .await?
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
    let headers = reader.read_headers().await?;
    let body = match headers.content_length() {
        Some(length) if length > 0 => reader.read_body(length).await?,
        _ => Vec::new(),
    };
    Ok((line, headers, body))
}

/// Open a `CONNECT` tunnel through the proxy and return the raw socket once
/// the proxy has answered `200`.
pub async fn connect_tunnel(proxy: SocketAddr, authority: &str) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    // byte at a time so no tunneled bytes are swallowed by a buffer
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let byte = stream.read_u8().await.unwrap();
        head.push(byte);
    }
    let head = String::from_utf8(head).unwrap();
    assert!(
        head.starts_with("HTTP/1.1 200 Connection established\r\n"),
        "unexpected CONNECT answer: {head}"
    );
    stream
}
