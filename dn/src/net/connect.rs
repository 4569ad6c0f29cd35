//! Establishing the single peer connection
//!
//! The server listens and accepts one peer; the client keeps retrying until
//! the server is up.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::SimResult;

/// Bind the listening socket
pub async fn listen(addr: &str) -> SimResult<TcpListener> {
    debug!(%addr, "listen: called");
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Waiting for peer");
    Ok(listener)
}

/// Accept exactly one peer
pub async fn accept_one(listener: &TcpListener) -> SimResult<TcpStream> {
    debug!("accept_one: called");
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true)?;
    info!(%peer, "Peer connected");
    Ok(stream)
}

/// Connect, retrying every `retry` until the peer accepts
///
/// `attempts` bounds the number of tries; `None` retries forever.
pub async fn connect_with_retry(addr: &str, retry: Duration, attempts: Option<u32>) -> SimResult<TcpStream> {
    debug!(%addr, ?retry, ?attempts, "connect_with_retry: called");
    let mut tried = 0u32;
    loop {
        tried += 1;
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                info!(%addr, attempts = tried, "Connected to peer");
                return Ok(stream);
            }
            Err(e) => {
                if attempts.is_some_and(|max| tried >= max) {
                    warn!(%addr, error = %e, "Giving up on peer");
                    return Err(e.into());
                }
                debug!(%addr, error = %e, "connect_with_retry: peer not ready, retrying");
                sleep(retry).await;
            }
        }
    }
}

/// Hand a connected socket to the blocking driver
pub fn into_std(stream: TcpStream) -> SimResult<std::net::TcpStream> {
    let stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    Ok(stream)
}
