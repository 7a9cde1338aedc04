//! Client side of a session.

use crate::codec::{BoxedStream, Pipe};
use crate::error::ProxyError;
use crate::message::{ProtocolVersion, Request, Response};
use crate::tls::{IssuedCertificate, TlsProvider};

/// Reads requests from the browser and writes responses back.
pub struct ClientHandler {
    pipe: Pipe,
}

impl ClientHandler {
    pub fn new(pipe: Pipe) -> Self {
        Self { pipe }
    }

    /// Read the next request head. `None` when the client closed the connection.
    pub async fn receive(&mut self) -> Result<Option<Request>, ProxyError> {
        let Some(line) = self.pipe.reader().read_request_line().await? else {
            return Ok(None);
        };
        let headers = self.pipe.reader().read_headers().await?;
        Ok(Some(Request::new(line, headers)))
    }

    /// Read the body announced by the request's framing headers.
    pub async fn receive_body(&mut self, request: &mut Request) -> Result<(), ProxyError> {
        if request.is_chunked() {
            let body = self.pipe.reader().read_chunked_body().await?;
            request.set_decoded_body(body);
        } else if let Some(length) = request.headers().content_length().filter(|n| *n > 0) {
            let body = self.pipe.reader().read_body(length).await?;
            request.set_body(body);
        }
        Ok(())
    }

    pub async fn send_response(&mut self, response: &Response) -> Result<(), ProxyError> {
        let mut writer = self.pipe.writer();
        writer.write_status_line(response.line()).await?;
        writer.write_headers(response.headers()).await?;
        writer.write_body(response.body()).await?;
        Ok(())
    }

    /// Synthesize and send a proxy-generated response.
    pub async fn respond(
        &mut self,
        version: &ProtocolVersion,
        code: u16,
        description: &str,
        body: Option<&str>,
        close: bool,
    ) -> Result<Response, ProxyError> {
        let response = Response::synthesize(version.clone(), code, description, body, close);
        self.send_response(&response).await?;
        Ok(response)
    }

    /// Server-role handshake; the returned handler speaks over TLS.
    pub async fn accept_tls(
        self,
        tls: &TlsProvider,
        certificate: &IssuedCertificate,
    ) -> Result<Self, ProxyError> {
        let limits = self.pipe.limits();
        let stream = tls.accept(self.pipe.into_stream(), certificate).await?;
        Ok(Self::new(Pipe::from_boxed(stream, limits)))
    }

    pub fn into_stream(self) -> BoxedStream {
        self.pipe.into_stream()
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.pipe.shutdown().await {
            tracing::trace!(error = %e, "Client shutdown failed");
        }
    }
}
