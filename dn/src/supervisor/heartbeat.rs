//! Liveness channel between the Supervisor and one worker
//!
//! Pings go down a small per-worker channel; pongs come back on one channel
//! shared by every worker and are attributed by the id they carry.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{Ping, Pong, WorkerId};
use crate::error::{SimError, SimResult};

/// At most this many pings queue up for a worker that is not reading
const PING_BUFFER: usize = 2;

/// Create the two ends of a worker's heartbeat channel
pub fn channel(id: WorkerId, pong_tx: mpsc::Sender<Pong>) -> (HeartbeatLink, HeartbeatResponder) {
    debug!(%id, "heartbeat::channel: called");
    let (ping_tx, ping_rx) = mpsc::channel(PING_BUFFER);
    (
        HeartbeatLink {
            id: id.clone(),
            ping_tx,
        },
        HeartbeatResponder { id, ping_rx, pong_tx },
    )
}

/// Supervisor end: sends pings
#[derive(Debug)]
pub struct HeartbeatLink {
    id: WorkerId,
    ping_tx: mpsc::Sender<Ping>,
}

impl HeartbeatLink {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Send a ping without waiting
    ///
    /// A full queue means earlier pings are still unread; the worker will miss
    /// its deadline anyway, so that is not an error here.
    pub fn ping(&self, seq: u64) -> SimResult<()> {
        debug!(id = %self.id, seq, "HeartbeatLink::ping: called");
        match self.ping_tx.try_send(Ping { seq }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(id = %self.id, seq, "HeartbeatLink::ping: queue full");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SimError::ChannelClosed(format!("heartbeat of {}", self.id)))
            }
        }
    }
}

/// Worker end: receives pings and answers with pongs
#[derive(Debug)]
pub struct HeartbeatResponder {
    id: WorkerId,
    ping_rx: mpsc::Receiver<Ping>,
    pong_tx: mpsc::Sender<Pong>,
}

impl HeartbeatResponder {
    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Wait for the next ping (`None` once the Supervisor is gone)
    pub async fn next_ping(&mut self) -> Option<Ping> {
        self.ping_rx.recv().await
    }

    /// Acknowledge a ping
    pub async fn respond(&self, ping: Ping) -> SimResult<()> {
        debug!(id = %self.id, seq = ping.seq, "HeartbeatResponder::respond: called");
        self.pong_tx
            .send(Pong {
                id: self.id.clone(),
                seq: ping.seq,
            })
            .await
            .map_err(|_| SimError::ChannelClosed("supervisor pong channel".to_string()))
    }

    /// Non-blocking ping check for units that run on their own thread
    pub fn try_next_ping(&mut self) -> Option<Ping> {
        self.ping_rx.try_recv().ok()
    }

    /// Acknowledge a ping from outside the runtime
    pub fn respond_blocking(&self, ping: Ping) -> SimResult<()> {
        debug!(id = %self.id, seq = ping.seq, "HeartbeatResponder::respond_blocking: called");
        self.pong_tx
            .blocking_send(Pong {
                id: self.id.clone(),
                seq: ping.seq,
            })
            .map_err(|_| SimError::ChannelClosed("supervisor pong channel".to_string()))
    }
}

/// Create a stop request pair
pub(crate) fn stop_pair() -> (StopTrigger, StopSignal) {
    let (tx, rx) = oneshot::channel();
    (StopTrigger { tx: Some(tx) }, StopSignal { rx, fired: false })
}

/// Supervisor side of a graceful stop request
#[derive(Debug)]
pub struct StopTrigger {
    tx: Option<oneshot::Sender<()>>,
}

impl StopTrigger {
    /// Fire once; later calls do nothing
    pub fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Worker side of a graceful stop request
///
/// Fires when the Supervisor asks for a stop or drops its trigger.
#[derive(Debug)]
pub struct StopSignal {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl StopSignal {
    /// Wait until a stop is requested; returns immediately once fired
    pub async fn recv(&mut self) {
        if self.fired {
            return;
        }
        let _ = (&mut self.rx).await;
        self.fired = true;
    }

    /// Non-blocking check for threads
    pub fn is_fired(&mut self) -> bool {
        if !self.fired {
            self.fired = !matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty));
        }
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_pong_carries_id_and_seq() {
        let (pong_tx, mut pong_rx) = mpsc::channel(4);
        let (link, mut responder) = channel(WorkerId::new("DRONE"), pong_tx);

        link.ping(7).unwrap();
        let ping = responder.next_ping().await.unwrap();
        assert_eq!(ping.seq, 7);
        responder.respond(ping).await.unwrap();

        let pong = pong_rx.recv().await.unwrap();
        assert_eq!(pong.id, WorkerId::new("DRONE"));
        assert_eq!(pong.seq, 7);
    }

    #[tokio::test]
    async fn test_ping_after_responder_drop_is_closed() {
        let (pong_tx, _pong_rx) = mpsc::channel(4);
        let (link, responder) = channel(WorkerId::new("OBST"), pong_tx);
        drop(responder);
        assert!(matches!(link.ping(1), Err(SimError::ChannelClosed(_))));
    }

    #[tokio::test]
    async fn test_full_ping_queue_is_not_an_error() {
        let (pong_tx, _pong_rx) = mpsc::channel(4);
        let (link, _responder) = channel(WorkerId::new("TARGET"), pong_tx);
        for seq in 0..(PING_BUFFER as u64 + 3) {
            assert!(link.ping(seq).is_ok());
        }
    }

    #[test]
    fn test_thread_side_answers() {
        let (pong_tx, mut pong_rx) = mpsc::channel(4);
        let (link, responder) = channel(WorkerId::new("NET"), pong_tx);

        link.ping(3).unwrap();
        let thread = std::thread::spawn(move || {
            let mut responder = responder;
            assert_eq!(responder.try_next_ping().map(|p| p.seq), Some(3));
            assert!(responder.try_next_ping().is_none());
            responder.respond_blocking(Ping { seq: 3 }).unwrap();
        });
        thread.join().unwrap();
        assert_eq!(pong_rx.blocking_recv().unwrap().seq, 3);
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let (mut trigger, mut signal) = stop_pair();
        assert!(!signal.is_fired());
        trigger.fire();
        trigger.fire();
        signal.recv().await;
        assert!(signal.is_fired());
        signal.recv().await;
    }

    #[tokio::test]
    async fn test_stop_signal_fires_on_trigger_drop() {
        let (trigger, mut signal) = stop_pair();
        drop(trigger);
        assert!(signal.is_fired());
    }
}
