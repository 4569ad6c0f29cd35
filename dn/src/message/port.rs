//! Worker-facing ends of the broker's local channels

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::envelope::{Frame, FrameDecoder};
use super::types::Message;
use crate::error::{SimError, SimResult};

/// The worker roles the broker routes between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerRole {
    Input,
    Drone,
    Obstacle,
    Target,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 4] = [
        WorkerRole::Input,
        WorkerRole::Drone,
        WorkerRole::Obstacle,
        WorkerRole::Target,
    ];

    /// Registry / supervisor tag for this role
    pub fn tag(&self) -> &'static str {
        match self {
            WorkerRole::Input => "INPUT",
            WorkerRole::Drone => "DRONE",
            WorkerRole::Obstacle => "OBST",
            WorkerRole::Target => "TARGET",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Send every frame of a message back to back on one sender
pub(crate) async fn send_message(tx: &mpsc::Sender<Frame>, msg: &Message) -> SimResult<()> {
    for frame in msg.to_frames() {
        tx.send(frame)
            .await
            .map_err(|_| SimError::ChannelClosed(format!("{} receiver dropped", msg.kind())))?;
    }
    Ok(())
}

/// Broker-side half of a worker connection
#[derive(Debug)]
pub struct BrokerLink {
    pub role: WorkerRole,
    pub to_worker: mpsc::Sender<Frame>,
    pub from_worker: mpsc::Receiver<Frame>,
}

/// Worker-side half of a broker connection
///
/// Not `Clone`: sending takes `&mut self`, so the frames of one message are
/// never interleaved with another sender's.
#[derive(Debug)]
pub struct WorkerPort {
    role: WorkerRole,
    tx: mpsc::Sender<Frame>,
    rx: mpsc::Receiver<Frame>,
    decoder: FrameDecoder,
}

impl WorkerPort {
    /// Role this port was attached as
    pub fn role(&self) -> WorkerRole {
        self.role
    }

    /// Send a message to the broker
    pub async fn send(&mut self, msg: &Message) -> SimResult<()> {
        debug!(role = %self.role, kind = %msg.kind(), "WorkerPort::send: called");
        send_message(&self.tx, msg).await
    }

    /// Next raw transfer from the broker (`None` once the broker is gone)
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Next complete message from the broker
    ///
    /// Malformed transfers surface as errors; `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<SimResult<Message>> {
        loop {
            let frame = self.rx.recv().await?;
            match self.decoder.push(frame) {
                Ok(Some(msg)) => return Some(Ok(msg)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }

    /// Non-blocking variant of [`WorkerPort::recv`]; `None` when nothing complete is queued
    pub fn try_recv(&mut self) -> Option<SimResult<Message>> {
        loop {
            let frame = self.rx.try_recv().ok()?;
            match self.decoder.push(frame) {
                Ok(Some(msg)) => return Some(Ok(msg)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Create a connected worker port / broker link pair
pub fn port_pair(role: WorkerRole, buffer: usize) -> (WorkerPort, BrokerLink) {
    debug!(%role, buffer, "port_pair: called");
    let (to_worker, worker_rx) = mpsc::channel(buffer);
    let (worker_tx, from_worker) = mpsc::channel(buffer);
    (
        WorkerPort {
            role,
            tx: worker_tx,
            rx: worker_rx,
            decoder: FrameDecoder::new(),
        },
        BrokerLink {
            role,
            to_worker,
            from_worker,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, MessageKind, Point};

    #[test]
    fn test_role_tags_unique() {
        let mut tags: Vec<_> = WorkerRole::ALL.iter().map(|r| r.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), WorkerRole::ALL.len());
    }

    #[tokio::test]
    async fn test_port_round_trip() {
        let (mut port, mut link) = port_pair(WorkerRole::Target, 8);

        port.send(&Message::Targets(vec![Point::new(2, 3)])).await.unwrap();
        assert_eq!(
            link.from_worker.recv().await,
            Some(Frame::Envelope(Envelope::new(MessageKind::Targets, "1")))
        );
        assert_eq!(link.from_worker.recv().await, Some(Frame::Points(vec![Point::new(2, 3)])));

        send_message(&link.to_worker, &Message::Input('a')).await.unwrap();
        assert_eq!(port.recv().await.unwrap().unwrap(), Message::Input('a'));
    }

    #[tokio::test]
    async fn test_recv_none_after_broker_drop() {
        let (mut port, link) = port_pair(WorkerRole::Drone, 4);
        drop(link);
        assert!(port.recv().await.is_none());
        assert!(port.send(&Message::Pid(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_try_recv_reassembles_queued_sets() {
        let (mut port, link) = port_pair(WorkerRole::Drone, 8);
        assert!(port.try_recv().is_none());

        send_message(&link.to_worker, &Message::Obstacles(vec![Point::new(1, 1)]))
            .await
            .unwrap();
        assert_eq!(
            port.try_recv().unwrap().unwrap(),
            Message::Obstacles(vec![Point::new(1, 1)])
        );
    }
}
