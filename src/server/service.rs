use super::codec::{write_response, CodecConfig, DecodeError, Decoded, RequestDecoder};
use crate::dispatcher::Dispatcher;
use may::net::TcpStream;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-connection request loop.
///
/// Cheap to clone: the accept loop hands a copy to every connection coroutine.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
    pub codec: CodecConfig,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, codec: CodecConfig) -> Self {
        Self { dispatcher, codec }
    }

    /// Serve requests from `reader` until the connection should close.
    ///
    /// Requests are handled one at a time. A decode failure ends the loop quietly:
    /// nothing is written for a request that could not be read in full.
    ///
    /// # Errors
    ///
    /// Write failures while sending a response.
    pub fn serve<R: Read, W: Write>(&self, reader: R, writer: &mut W) -> io::Result<()> {
        let mut decoder = RequestDecoder::new(reader, self.codec.clone());
        let mut served = 0usize;
        loop {
            match decoder.decode() {
                Ok(Decoded::Request(req)) => {
                    let started = Instant::now();
                    let request_id = req.request_id;
                    let method = req.method.clone();
                    let path = req.path.clone();
                    let keep_alive = req.wants_keep_alive();

                    let response = self.dispatcher.dispatch(*req);
                    let status = response.status;
                    let keep_alive = write_response(writer, response, keep_alive)?;
                    served += 1;

                    info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = status,
                        latency_ms = started.elapsed().as_millis() as u64,
                        keep_alive = keep_alive,
                        "Request complete"
                    );
                    if !keep_alive {
                        return Ok(());
                    }
                }
                Ok(Decoded::Favicon { version }) => {
                    let response = self.dispatcher.favicon_response(&version);
                    write_response(writer, response, false)?;
                    return Ok(());
                }
                Err(DecodeError::ConnectionClosed) => {
                    debug!(requests_served = served, "Connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        requests_served = served,
                        "Dropping connection: request could not be decoded"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Serve one accepted socket.
    pub fn serve_stream(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        debug!(peer = %peer, "Connection accepted");

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to clone connection for reading");
                return;
            }
        };
        let mut writer = stream;
        if let Err(e) = self.serve(reader, &mut writer) {
            warn!(peer = %peer, error = %e, "Connection write failed");
        }
    }
}
