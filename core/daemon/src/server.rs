//! Unix-socket front end.
//!
//! One request per connection. Each connection runs as its own task, so a
//! request waiting on the activation script does not block status queries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use reshadeck_daemon_protocol::{
    ErrorInfo, Request, Response, ERROR_TOO_MANY_CONNECTIONS, MAX_REQUEST_BYTES,
};

use crate::dispatch::{handle_request, DaemonContext};

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;
const MAX_ACTIVE_CONNECTIONS: usize = 32;

/// Accepts connections until `shutdown` resolves.
pub async fn serve(
    listener: UnixListener,
    context: Arc<DaemonContext>,
    shutdown: impl Future<Output = ()>,
) {
    let permits = Arc::new(Semaphore::new(MAX_ACTIVE_CONNECTIONS));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((mut stream, _)) => {
                    let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                        warn!("Connection limit reached; rejecting client");
                        let response = Response::error(
                            None,
                            ERROR_TOO_MANY_CONNECTIONS,
                            "too many active connections",
                        );
                        let _ = write_response(&mut stream, &response).await;
                        continue;
                    };
                    let context = Arc::clone(&context);
                    tokio::spawn(async move {
                        handle_connection(stream, &context).await;
                        drop(permit);
                    });
                }
                Err(err) => warn!(error = %err, "Failed to accept daemon connection"),
            },
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}

/// Resolves on SIGTERM or Ctrl-C.
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = terminate.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

async fn handle_connection(mut stream: UnixStream, context: &DaemonContext) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, &response).await;
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, context).await;
    if let Err(err) = write_response(&mut stream, &response).await {
        debug!(error = %err, "Client went away before the response");
    }
}

async fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let timeout = Duration::from_secs(READ_TIMEOUT_SECS);
    match tokio::time::timeout(timeout, read_line(stream)).await {
        Ok(result) => result,
        Err(_) => Err(ErrorInfo::new("read_timeout", "request timed out")),
    }
}

async fn read_line(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => {
            if buffer[index + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

async fn write_response(stream: &mut UnixStream, response: &Response) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    stream.write_all(&payload).await?;
    stream.flush().await
}
