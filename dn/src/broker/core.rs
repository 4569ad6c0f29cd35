//! Main Broker task implementation

use std::collections::BTreeMap;
use std::future;
use std::pin::Pin;

use futures::stream::{self, SelectAll, Stream, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::config::BrokerConfig;
use super::state::WorldState;
use crate::message::{Frame, FrameDecoder, Message, Point, Position, WindowSize, WorkerPort, WorkerRole, port_pair};
use crate::net::{NetworkBridge, SessionEvent, SessionRole, from_virtual, to_virtual};
use crate::supervisor::{HeartbeatResponder, Ping, StopSignal, SupervisorHandle};

/// Supervisor id of the broker unit
pub const BROKER_TAG: &str = "BB";

/// One inbound transfer; `None` marks the worker's channel closing
type Inbound = (WorkerRole, Option<Frame>);
type InboundStream = Pin<Box<dyn Stream<Item = Inbound> + Send>>;

fn inbound_stream(role: WorkerRole, rx: mpsc::Receiver<Frame>) -> InboundStream {
    stream::unfold(Some(rx), move |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(frame) => Some(((role, Some(frame)), Some(rx))),
            None => Some(((role, None), None)),
        }
    })
    .boxed()
}

async fn next_event(network: &mut Option<NetworkBridge>) -> Option<SessionEvent> {
    match network {
        Some(bridge) => bridge.next_event().await,
        None => future::pending().await,
    }
}

async fn next_ping(heartbeat: &mut Option<HeartbeatResponder>) -> Option<Ping> {
    match heartbeat {
        Some(responder) => responder.next_ping().await,
        None => future::pending().await,
    }
}

async fn stop_requested(stop: &mut Option<StopSignal>) {
    match stop {
        Some(signal) => signal.recv().await,
        None => future::pending().await,
    }
}

/// The blackboard: single owner of the world state and router between workers
pub struct Broker {
    config: BrokerConfig,
    state: WorldState,
    rng: StdRng,
    outbound: BTreeMap<WorkerRole, mpsc::Sender<Frame>>,
    inbound: SelectAll<InboundStream>,
    decoders: BTreeMap<WorkerRole, FrameDecoder>,
    network: Option<NetworkBridge>,
    supervisor: Option<SupervisorHandle>,
    heartbeat: Option<HeartbeatResponder>,
    stop: Option<StopSignal>,
    last_relocation: Instant,
    quit_requested: bool,
}

impl Broker {
    /// Create a new Broker with the given configuration
    pub fn new(config: BrokerConfig) -> Self {
        debug!(?config, "Broker::new: called");
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            state: WorldState::new(config.window()),
            config,
            rng,
            outbound: BTreeMap::new(),
            inbound: SelectAll::new(),
            decoders: BTreeMap::new(),
            network: None,
            supervisor: None,
            heartbeat: None,
            stop: None,
            last_relocation: Instant::now(),
            quit_requested: false,
        }
    }

    /// Connect a worker; it is sent the current window size right away
    pub fn attach(&mut self, role: WorkerRole) -> WorkerPort {
        debug!(%role, "Broker::attach: called");
        let (port, link) = port_pair(role, self.config.worker_channel_buffer);
        if self.outbound.insert(role, link.to_worker).is_some() {
            warn!(%role, "Worker attached twice, replacing previous channel");
        }
        self.inbound.push(inbound_stream(role, link.from_worker));
        self.decoders.insert(role, FrameDecoder::new());

        if role != WorkerRole::Input {
            self.deliver(role, &Message::Size(self.state.window()));
        }
        port
    }

    /// Mirror the drone to a peer through this session
    pub fn with_network(mut self, bridge: NetworkBridge) -> Self {
        debug!(role = %bridge.role(), "Broker::with_network: called");
        self.network = Some(bridge);
        self
    }

    /// Where quit requests and worker pids go
    pub fn with_supervisor(mut self, supervisor: SupervisorHandle) -> Self {
        debug!("Broker::with_supervisor: called");
        self.supervisor = Some(supervisor);
        self
    }

    /// Answer the supervisor's pings and honour its stop request
    pub fn with_heartbeat(mut self, responder: HeartbeatResponder, stop: StopSignal) -> Self {
        debug!(id = %responder.id(), "Broker::with_heartbeat: called");
        self.heartbeat = Some(responder);
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn is_attached(&self, role: WorkerRole) -> bool {
        self.outbound.contains_key(&role)
    }

    /// Send one message to one worker without waiting
    ///
    /// Every frame of the message is reserved up front, so a receiver sees
    /// all of it or none of it. A full channel drops the message; a closed
    /// one stops routing to that worker.
    fn deliver(&mut self, role: WorkerRole, msg: &Message) {
        let Some(tx) = self.outbound.get(&role) else {
            debug!(%role, kind = %msg.kind(), "Broker::deliver: worker not attached");
            return;
        };
        let frames = msg.to_frames();
        let closed = match tx.try_reserve_many(frames.len()) {
            Ok(permits) => {
                for (permit, frame) in permits.zip(frames) {
                    permit.send(frame);
                }
                false
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                warn!(%role, kind = %msg.kind(), "Worker channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(())) => true,
        };
        if closed {
            warn!(%role, "Worker channel closed, routing stopped");
            self.outbound.remove(&role);
        }
    }

    fn broadcast(&mut self, roles: &[WorkerRole], msg: &Message) {
        for role in roles {
            self.deliver(*role, msg);
        }
    }

    /// New drone position: collect targets on its cell and mirror it to the peer
    pub fn submit_position(&mut self, position: Position) {
        debug!(x = position.x, y = position.y, "Broker::submit_position: called");
        self.state.set_drone(position);

        let removed = self.state.remove_targets_at(position.cell());
        if removed > 0 {
            info!(
                removed,
                remaining = self.state.targets().len(),
                "Target reached"
            );
            let targets = Message::Targets(self.state.targets().to_vec());
            self.broadcast(&[WorkerRole::Drone, WorkerRole::Obstacle], &targets);

            if self.state.targets().is_empty() {
                info!("All targets reached, requesting a new set");
                let obstacles = Message::Obstacles(self.state.obstacles().to_vec());
                self.deliver(WorkerRole::Target, &obstacles);
            }
        }

        if let Some(bridge) = &self.network {
            bridge.publish_position(to_virtual(position, self.state.window().height));
        }
    }

    pub fn submit_obstacle_set(&mut self, points: Vec<Point>) {
        debug!(count = points.len(), "Broker::submit_obstacle_set: called");
        self.state.replace_obstacles(points);
        let obstacles = Message::Obstacles(self.state.obstacles().to_vec());
        self.broadcast(&[WorkerRole::Drone, WorkerRole::Target], &obstacles);
    }

    pub fn submit_target_set(&mut self, points: Vec<Point>) {
        debug!(count = points.len(), "Broker::submit_target_set: called");
        self.state.replace_targets(points);
        let targets = Message::Targets(self.state.targets().to_vec());
        self.broadcast(&[WorkerRole::Drone, WorkerRole::Obstacle], &targets);
    }

    /// Relocate one obstacle once per obstacle period; returns whether one moved
    pub fn periodic_tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_relocation) < self.config.obstacle_period() {
            return false;
        }
        self.last_relocation = now;

        let Some((index, cell)) = self.state.relocate_obstacle(&mut self.rng) else {
            debug!("Broker::periodic_tick: nothing to relocate");
            return false;
        };
        debug!(index, x = cell.x, y = cell.y, "Broker::periodic_tick: obstacle relocated");
        let obstacles = Message::Obstacles(self.state.obstacles().to_vec());
        self.broadcast(&[WorkerRole::Drone, WorkerRole::Target], &obstacles);
        true
    }

    /// Peer's drone moved (`position` in the wire frame)
    ///
    /// The initiator shows it to the local drone as an obstacle.
    pub fn on_network_remote_update(&mut self, position: Position) {
        debug!(x = position.x, y = position.y, "Broker::on_network_remote_update: called");
        let local = from_virtual(position, self.state.window().height);
        self.state.set_remote(local);

        if self.network.as_ref().map(|b| b.role()) == Some(SessionRole::Initiator) {
            self.deliver(WorkerRole::Drone, &Message::Obstacles(vec![local.cell()]));
        }
    }

    fn apply_size(&mut self, size: WindowSize) {
        debug!(width = size.width, height = size.height, "Broker::apply_size: called");
        self.state.set_window(size);
        self.broadcast(
            &[WorkerRole::Drone, WorkerRole::Obstacle, WorkerRole::Target],
            &Message::Size(size),
        );
    }

    async fn on_input(&mut self, key: char) {
        debug!(%key, "Broker::on_input: called");
        if key != 'q' {
            self.deliver(WorkerRole::Drone, &Message::Input(key));
            return;
        }

        info!("Quit key pressed");
        self.quit_requested = true;
        if let Some(bridge) = &self.network {
            bridge.request_quit();
        }
        if let Some(supervisor) = &self.supervisor
            && let Err(e) = supervisor.request_quit(WorkerRole::Input.tag()).await
        {
            warn!(error = %e, "Failed to request quit");
        }
    }

    /// Route one decoded message from a worker
    pub async fn handle_message(&mut self, from: WorkerRole, msg: Message) {
        debug!(%from, kind = %msg.kind(), "Broker::handle_message: called");
        match msg {
            Message::Position(position) => self.submit_position(position),
            Message::Obstacles(points) => self.submit_obstacle_set(points),
            Message::Targets(points) => self.submit_target_set(points),
            Message::Input(key) => self.on_input(key).await,
            Message::Force(force) => self.state.set_force(force),
            Message::Size(size) => self.apply_size(size),
            Message::Pid(pid) => {
                if let Some(supervisor) = &self.supervisor
                    && let Err(e) = supervisor.report_pid(from.tag(), pid).await
                {
                    warn!(%from, pid, error = %e, "Failed to report pid");
                }
            }
        }
    }

    async fn on_frame(&mut self, role: WorkerRole, frame: Option<Frame>) {
        let Some(frame) = frame else {
            warn!(%role, "Worker disconnected");
            self.decoders.remove(&role);
            return;
        };
        let Some(decoder) = self.decoders.get_mut(&role) else {
            return;
        };
        match decoder.push(frame) {
            Ok(Some(msg)) => self.handle_message(role, msg).await,
            Ok(None) => {}
            Err(e) => warn!(%role, error = %e, "Discarding malformed transfer"),
        }
    }

    fn on_session_event(&mut self, event: Option<SessionEvent>) {
        match event {
            Some(SessionEvent::Negotiated(size)) => {
                info!(width = size.width, height = size.height, "Window size negotiated with peer");
                self.apply_size(size);
            }
            Some(SessionEvent::RemoteDrone(position)) => self.on_network_remote_update(position),
            Some(SessionEvent::Closed(end)) => {
                info!(?end, "Network session closed");
                self.network = None;
            }
            None => {
                warn!("Network session dropped its link");
                self.network = None;
            }
        }
    }

    /// Run until stopped, or until quit is pressed when nothing supervises the broker
    pub async fn run(mut self) -> WorldState {
        info!("Broker started");
        let mut ticker = interval(self.config.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.last_relocation = Instant::now();

        loop {
            if self.quit_requested && self.supervisor.is_none() {
                info!("Quit requested, no supervisor to wait for");
                break;
            }

            tokio::select! {
                Some((role, frame)) = self.inbound.next(), if !self.inbound.is_empty() => {
                    self.on_frame(role, frame).await;
                }
                event = next_event(&mut self.network) => {
                    self.on_session_event(event);
                }
                ping = next_ping(&mut self.heartbeat) => match ping {
                    Some(ping) => {
                        if let Some(responder) = &self.heartbeat
                            && let Err(e) = responder.respond(ping).await
                        {
                            debug!(error = %e, "Broker::run: supervisor gone");
                        }
                    }
                    None => {
                        info!("Supervisor gone");
                        break;
                    }
                },
                _ = stop_requested(&mut self.stop) => {
                    info!("Stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.periodic_tick(Instant::now());
                }
            }
        }

        if let Some(bridge) = &self.network {
            bridge.request_quit();
        }
        info!("Broker stopped");
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Envelope, MessageKind};
    use crate::net::{SessionLink, bridge};
    use std::time::Duration;

    fn config() -> BrokerConfig {
        BrokerConfig {
            seed: Some(42),
            window_width: 20,
            window_height: 10,
            ..BrokerConfig::default()
        }
    }

    /// Broker with every worker attached; the initial SIZE is already consumed
    async fn attached(config: BrokerConfig) -> (Broker, BTreeMap<WorkerRole, WorkerPort>) {
        let mut broker = Broker::new(config);
        let mut ports = BTreeMap::new();
        for role in WorkerRole::ALL {
            let mut port = broker.attach(role);
            if role != WorkerRole::Input {
                assert!(matches!(port.try_recv(), Some(Ok(Message::Size(_)))));
            }
            ports.insert(role, port);
        }
        (broker, ports)
    }

    fn networked(role: SessionRole) -> (Broker, SessionLink, BTreeMap<WorkerRole, WorkerPort>) {
        let (bridge, link) = bridge(role, WindowSize::new(20, 10), 8);
        let mut broker = Broker::new(config()).with_network(bridge);
        let mut ports = BTreeMap::new();
        for role in WorkerRole::ALL {
            let mut port = broker.attach(role);
            let _ = port.try_recv();
            ports.insert(role, port);
        }
        (broker, link, ports)
    }

    fn take(ports: &mut BTreeMap<WorkerRole, WorkerPort>, role: WorkerRole) -> Option<Message> {
        ports.get_mut(&role)?.try_recv().map(|r| r.unwrap())
    }

    #[tokio::test]
    async fn test_attach_sends_window_size() {
        let mut broker = Broker::new(config());
        let mut drone = broker.attach(WorkerRole::Drone);
        let mut input = broker.attach(WorkerRole::Input);
        assert_eq!(
            drone.try_recv().unwrap().unwrap(),
            Message::Size(WindowSize::new(20, 10))
        );
        assert!(input.try_recv().is_none());
        assert!(broker.is_attached(WorkerRole::Input));
    }

    #[tokio::test]
    async fn test_collision_rebroadcasts_targets_atomically() {
        let (mut broker, mut ports) = attached(config()).await;
        broker.submit_target_set(vec![Point::new(3, 4), Point::new(8, 8)]);
        let _ = take(&mut ports, WorkerRole::Drone);
        let _ = take(&mut ports, WorkerRole::Obstacle);

        broker.submit_position(Position::new(3.7, 4.2));
        assert_eq!(broker.state().targets(), &[Point::new(8, 8)]);

        // Count envelope and payload arrive back to back
        let obstacle = ports.get_mut(&WorkerRole::Obstacle).unwrap();
        assert_eq!(
            obstacle.recv_frame().await,
            Some(Frame::Envelope(Envelope::new(MessageKind::Targets, "1")))
        );
        assert_eq!(obstacle.recv_frame().await, Some(Frame::Points(vec![Point::new(8, 8)])));

        assert_eq!(
            take(&mut ports, WorkerRole::Drone),
            Some(Message::Targets(vec![Point::new(8, 8)]))
        );
        assert!(take(&mut ports, WorkerRole::Target).is_none());
    }

    #[tokio::test]
    async fn test_last_target_triggers_regeneration() {
        let (mut broker, mut ports) = attached(config()).await;
        broker.submit_obstacle_set(vec![Point::new(5, 5)]);
        broker.submit_target_set(vec![Point::new(2, 2)]);
        let _ = take(&mut ports, WorkerRole::Target);

        broker.submit_position(Position::new(2.5, 2.5));
        assert!(broker.state().targets().is_empty());
        assert_eq!(
            take(&mut ports, WorkerRole::Target),
            Some(Message::Obstacles(vec![Point::new(5, 5)]))
        );
    }

    #[tokio::test]
    async fn test_no_collision_sends_nothing() {
        let (mut broker, mut ports) = attached(config()).await;
        broker.submit_target_set(vec![Point::new(9, 9)]);
        let _ = take(&mut ports, WorkerRole::Drone);
        let _ = take(&mut ports, WorkerRole::Obstacle);

        broker.submit_position(Position::new(1.0, 1.0));
        assert!(take(&mut ports, WorkerRole::Drone).is_none());
        assert!(take(&mut ports, WorkerRole::Obstacle).is_none());
        assert_eq!(broker.state().drone(), Position::new(1.0, 1.0));
    }

    #[tokio::test]
    async fn test_set_routing() {
        let (mut broker, mut ports) = attached(config()).await;
        broker.submit_obstacle_set(vec![Point::new(1, 2)]);
        assert_eq!(
            take(&mut ports, WorkerRole::Drone),
            Some(Message::Obstacles(vec![Point::new(1, 2)]))
        );
        assert_eq!(
            take(&mut ports, WorkerRole::Target),
            Some(Message::Obstacles(vec![Point::new(1, 2)]))
        );
        assert!(take(&mut ports, WorkerRole::Obstacle).is_none());

        broker.submit_target_set(Vec::new());
        assert_eq!(take(&mut ports, WorkerRole::Drone), Some(Message::Targets(Vec::new())));
        assert_eq!(take(&mut ports, WorkerRole::Obstacle), Some(Message::Targets(Vec::new())));
        assert!(take(&mut ports, WorkerRole::Target).is_none());
    }

    #[tokio::test]
    async fn test_periodic_tick_relocates_once_per_period() {
        let (mut broker, mut ports) = attached(config()).await;
        broker.submit_obstacle_set(vec![Point::new(5, 5), Point::new(6, 6)]);
        let _ = take(&mut ports, WorkerRole::Drone);
        let _ = take(&mut ports, WorkerRole::Target);

        let start = broker.last_relocation;
        assert!(!broker.periodic_tick(start + Duration::from_millis(100)));
        assert!(take(&mut ports, WorkerRole::Drone).is_none());

        assert!(broker.periodic_tick(start + Duration::from_secs(5)));
        let Some(Message::Obstacles(moved)) = take(&mut ports, WorkerRole::Drone) else {
            panic!("expected an obstacle set")
        };
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().all(|p| broker.state().window().contains_inner(*p)));
        assert!(take(&mut ports, WorkerRole::Target).is_some());

        assert!(!broker.periodic_tick(start + Duration::from_secs(6)));
    }

    #[tokio::test]
    async fn test_periodic_tick_without_obstacles() {
        let (mut broker, mut ports) = attached(config()).await;
        let start = broker.last_relocation;
        assert!(!broker.periodic_tick(start + Duration::from_secs(10)));
        assert!(take(&mut ports, WorkerRole::Drone).is_none());
    }

    #[tokio::test]
    async fn test_full_channel_drops_whole_message() {
        let config = BrokerConfig {
            worker_channel_buffer: 3,
            ..config()
        };
        let mut broker = Broker::new(config);
        let mut drone = broker.attach(WorkerRole::Drone);

        // SIZE plus one set fill the channel; the second set does not fit
        broker.submit_obstacle_set(vec![Point::new(1, 1)]);
        broker.submit_obstacle_set(vec![Point::new(2, 2)]);

        assert!(matches!(drone.try_recv(), Some(Ok(Message::Size(_)))));
        assert_eq!(
            drone.try_recv().unwrap().unwrap(),
            Message::Obstacles(vec![Point::new(1, 1)])
        );
        assert!(drone.try_recv().is_none());
        assert!(broker.is_attached(WorkerRole::Drone));
    }

    #[tokio::test]
    async fn test_closed_worker_stops_routing() {
        let mut broker = Broker::new(config());
        let drone = broker.attach(WorkerRole::Drone);
        drop(drone);
        broker.submit_obstacle_set(vec![Point::new(1, 1)]);
        assert!(!broker.is_attached(WorkerRole::Drone));
    }

    #[tokio::test]
    async fn test_position_published_in_virtual_frame() {
        let (mut broker, link, _ports) = networked(SessionRole::Responder);
        broker.submit_position(Position::new(4.0, 3.0));
        assert_eq!(link.position(), Position::new(4.0, 7.0));
    }

    #[tokio::test]
    async fn test_remote_update_as_obstacle_for_initiator() {
        let (mut broker, _link, mut ports) = networked(SessionRole::Initiator);
        broker.on_network_remote_update(Position::new(4.5, 7.0));
        assert_eq!(broker.state().remote(), Some(Position::new(4.5, 3.0)));
        assert_eq!(
            take(&mut ports, WorkerRole::Drone),
            Some(Message::Obstacles(vec![Point::new(4, 3)]))
        );
    }

    #[tokio::test]
    async fn test_remote_update_stored_only_for_responder() {
        let (mut broker, _link, mut ports) = networked(SessionRole::Responder);
        broker.on_network_remote_update(Position::new(1.0, 1.0));
        assert_eq!(broker.state().remote(), Some(Position::new(1.0, 9.0)));
        assert!(take(&mut ports, WorkerRole::Drone).is_none());
    }

    #[tokio::test]
    async fn test_negotiated_size_rebroadcast() {
        let (mut broker, link, mut ports) = networked(SessionRole::Responder);
        link.emit(SessionEvent::Negotiated(WindowSize::new(120, 40))).await.unwrap();
        let event = broker.network.as_mut().unwrap().next_event().await;
        broker.on_session_event(event);

        assert_eq!(broker.state().window(), WindowSize::new(120, 40));
        for role in [WorkerRole::Drone, WorkerRole::Obstacle, WorkerRole::Target] {
            assert_eq!(
                take(&mut ports, role),
                Some(Message::Size(WindowSize::new(120, 40)))
            );
        }
    }

    #[tokio::test]
    async fn test_run_routes_and_quits_without_supervisor() {
        let (broker, mut ports) = attached(config()).await;
        let running = tokio::spawn(broker.run());

        let mut drone = ports.remove(&WorkerRole::Drone).unwrap();
        let mut input = ports.remove(&WorkerRole::Input).unwrap();
        let mut target = ports.remove(&WorkerRole::Target).unwrap();

        target.send(&Message::Targets(vec![Point::new(3, 3)])).await.unwrap();
        assert_eq!(
            drone.recv().await.unwrap().unwrap(),
            Message::Targets(vec![Point::new(3, 3)])
        );

        input.send(&Message::Input('w')).await.unwrap();
        assert_eq!(drone.recv().await.unwrap().unwrap(), Message::Input('w'));

        drone.send(&Message::Position(Position::new(3.5, 3.5))).await.unwrap();
        assert_eq!(drone.recv().await.unwrap().unwrap(), Message::Targets(Vec::new()));
        input.send(&Message::Input('q')).await.unwrap();

        let state = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.drone(), Position::new(3.5, 3.5));
        assert!(state.targets().is_empty());
    }

    #[tokio::test]
    async fn test_run_under_supervisor() {
        use crate::supervisor::{Supervisor, SupervisorConfig, SupervisorOutcome, WorkerId};

        let supervisor = Supervisor::new(SupervisorConfig {
            ping_timeout_ms: 500,
            cycle_delay_ms: 10,
            grace_period_ms: 100,
            ..SupervisorConfig::default()
        });
        let handle = supervisor.handle();
        let supervising = tokio::spawn(supervisor.run());

        let enrolment = handle.enrol(BROKER_TAG);
        let broker = Broker::new(config())
            .with_supervisor(handle.clone())
            .with_heartbeat(enrolment.responder, enrolment.stop);
        let running = tokio::spawn(broker.run());
        handle
            .register(enrolment.pending.task(running.abort_handle()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = handle.snapshot().await.unwrap();
        assert!(status.cycles >= 2);
        assert_eq!(status.workers.len(), 1);

        handle.request_quit("TEST").await.unwrap();
        let report = supervising.await.unwrap();
        assert_eq!(
            report.outcome,
            SupervisorOutcome::Quit {
                from: WorkerId::new("TEST")
            }
        );
        assert!(report.killed.is_empty());
        assert!(tokio::time::timeout(Duration::from_secs(1), running).await.is_ok());
    }
}
