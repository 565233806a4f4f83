//! The hub: routes protocol lines to group state, aggregation and consumers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use clickerhub_hub_aggregation::GroupAnswers;
use clickerhub_hub_connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use clickerhub_hub_consumers::{ConsumerRegistry, DeliveryReport, Dispatcher};
use clickerhub_protocol::{
    Answer, Codec, Credentials, Inbound, OpenQuestion, Outbound, QuestionSpec,
};

use crate::error::HubError;
use crate::options::HubOptions;

/// State of one open group.
#[derive(Debug)]
struct GroupState {
    question: QuestionSpec,
    answers: GroupAnswers,
}

/// Snapshot for operator status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStatus {
    pub state: ConnectionState,
    pub address: Option<String>,
    pub open_groups: Vec<String>,
    pub available: Vec<String>,
    pub disabled: Vec<String>,
}

/// Communication and aggregation hub.
///
/// Owns the server connection, the open groups and the consumer registry.
/// Lines are processed one at a time by [`Hub::run`], so answers within a
/// group are always handled in arrival order.
pub struct Hub {
    connection: ConnectionManager,
    registry: Arc<ConsumerRegistry>,
    dispatcher: Dispatcher,
    codec: Codec,
    groups: Mutex<HashMap<String, GroupState>>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    cancel: CancellationToken,
}

impl Hub {
    /// Creates a hub. Nothing connects until
    /// [`set_server_address`](Self::set_server_address) is called.
    pub fn new(
        credentials: Credentials,
        registry: Arc<ConsumerRegistry>,
        options: HubOptions,
    ) -> Arc<Self> {
        Self::build(credentials, registry, options, None)
    }

    /// Like [`new`](Self::new), also sending one report per delivery to
    /// `reports`.
    pub fn with_delivery_reports(
        credentials: Credentials,
        registry: Arc<ConsumerRegistry>,
        options: HubOptions,
        reports: mpsc::UnboundedSender<DeliveryReport>,
    ) -> Arc<Self> {
        Self::build(credentials, registry, options, Some(reports))
    }

    fn build(
        credentials: Credentials,
        registry: Arc<ConsumerRegistry>,
        options: HubOptions,
        reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
    ) -> Arc<Self> {
        let codec = Codec::new(options.delimiters);
        let connection = ConnectionManager::new(credentials, codec.clone(), options.connect);
        let mut dispatcher = Dispatcher::new(options.delivery_timeout);
        if let Some(tx) = reports {
            dispatcher = dispatcher.with_reports(tx);
        }

        Arc::new(Self {
            connection,
            registry,
            dispatcher,
            codec,
            groups: Mutex::new(HashMap::new()),
            events_rx: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Connects to the server at `address`, dropping any current session.
    ///
    /// The announcement lists the consumer keys available at this moment.
    pub async fn set_server_address(&self, address: &str) -> Result<(), HubError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(HubError::NoAddress);
        }
        self.connection.close().await;
        self.teardown_groups().await;
        self.connect_to(address).await
    }

    /// Available consumer keys, in order.
    pub async fn list_available_consumer_keys(&self) -> Vec<String> {
        self.registry.available_keys().await
    }

    /// Enables or disables a consumer key. Takes effect for groups opened
    /// afterwards and for the next announcement.
    pub async fn set_consumer_enabled(&self, key: &str, enabled: bool) -> Result<(), HubError> {
        self.registry.set_enabled(key, enabled).await?;
        Ok(())
    }

    /// Ids of the currently open groups, sorted.
    pub async fn open_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.groups.lock().await.keys().cloned().collect();
        groups.sort();
        groups
    }

    pub async fn status(&self) -> HubStatus {
        HubStatus {
            state: self.connection.state(),
            address: self.connection.address().await,
            open_groups: self.open_groups().await,
            available: self.registry.available_keys().await,
            disabled: self.registry.disabled_keys().await,
        }
    }

    /// Runs the event loop until [`shutdown`](Self::shutdown).
    ///
    /// Can run only once per hub.
    pub async fn run(self: &Arc<Self>) -> Result<(), HubError> {
        let mut events = self.take_events().await?;
        info!("hub event loop started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        info!("hub event loop stopped");
        Ok(())
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<(), HubError>> {
        let hub = Arc::clone(self);
        tokio::spawn(async move { hub.run().await })
    }

    /// Stops the event loop, closes the connection and deactivates every
    /// consumer instance. In-flight deliveries are allowed to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.connection.shutdown().await;
        self.teardown_groups().await;
        self.dispatcher.wait_idle().await;
        info!("hub shut down");
    }

    /// Waits for every delivery spawned so far.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    async fn take_events(&self) -> Result<mpsc::Receiver<ConnectionEvent>, HubError> {
        let mut slot = self.events_rx.lock().await;
        if slot.is_none() {
            *slot = self.connection.take_events().await;
        }
        slot.take().ok_or(HubError::AlreadyRunning)
    }

    async fn connect_to(&self, address: &str) -> Result<(), HubError> {
        let keys = self.registry.available_keys().await;
        self.connection.connect(address, &keys).await?;
        Ok(())
    }

    async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Line(line) => self.handle_line(&line).await,
            ConnectionEvent::Disconnected { connection, reason } => {
                if self.connection.current_connection().await != Some(connection) {
                    debug!(connection, ?reason, "disconnect of a replaced connection");
                    return;
                }
                warn!(connection, ?reason, "connection lost, reconnecting");
                self.teardown_groups().await;
                self.reconnect().await;
            }
            ConnectionEvent::StateChanged(state) => debug!(?state, "connection state"),
            ConnectionEvent::Connecting {
                attempt,
                max_attempts,
            } => trace!(attempt, max_attempts, "connect attempt"),
        }
    }

    async fn reconnect(&self) {
        let Some(address) = self.connection.address().await else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        match self.connect_to(&address).await {
            Ok(()) => info!(address = %address, "reconnected"),
            Err(e) => warn!(address = %address, error = %e, "reconnect failed, staying offline"),
        }
    }

    /// Decodes and applies one inbound line. Malformed lines are logged and
    /// dropped.
    pub async fn handle_line(&self, line: &str) {
        let inbound = match self.codec.decode(line) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, %line, "dropping malformed line");
                return;
            }
        };

        match inbound {
            Inbound::Open(open) => self.open_groups_for(&open).await,
            Inbound::Close(groups) => {
                for group in groups {
                    self.close_group(&group).await;
                }
            }
            Inbound::Answer(answer) => self.record_answer(answer).await,
            Inbound::HeartbeatProbe => {
                let ack = self.codec.encode(&Outbound::HeartbeatAck);
                if let Err(e) = self.connection.send_line(ack).await {
                    debug!(error = %e, "could not answer probe");
                }
            }
            Inbound::HeartbeatAck | Inbound::Blank => {}
        }
    }

    async fn open_groups_for(&self, open: &OpenQuestion) {
        let keys = open.consumer_keys();
        for target in &open.groups {
            let replaced = self.groups.lock().await.insert(
                target.name.clone(),
                GroupState {
                    question: open.question.clone(),
                    answers: GroupAnswers::new(),
                },
            );
            if replaced.is_some() {
                info!(group = %target.name, "group reopened, previous question replaced");
            }

            let created = self
                .registry
                .instantiate_for_group(&keys, &target.name, &open.question)
                .await;
            info!(
                group = %target.name,
                question = %open.question.id,
                consumers = created.len(),
                "group opened"
            );
        }
    }

    async fn close_group(&self, group: &str) {
        let existed = self.groups.lock().await.remove(group).is_some();
        let removed = self.registry.deactivate_group(group).await;
        if existed {
            info!(group = %group, consumers = removed, "group closed");
        } else {
            debug!(group = %group, "close for unknown group");
        }
    }

    async fn record_answer(&self, answer: Answer) {
        let consumers = self.registry.active_for_group(&answer.group).await;
        let mut groups = self.groups.lock().await;
        let Some(state) = groups.get_mut(&answer.group) else {
            debug!(group = %answer.group, participant = %answer.participant, "answer for unknown group");
            return;
        };

        state.answers.record(&answer.participant, &answer.values);
        trace!(
            group = %answer.group,
            participant = %answer.participant,
            participants = state.answers.len(),
            "answer recorded"
        );

        if !consumers.is_empty() {
            self.dispatcher
                .dispatch(&answer.group, &consumers, &state.answers, &state.question);
        }
    }

    /// Drops every open group and deactivates their consumers.
    async fn teardown_groups(&self) {
        let dropped = {
            let mut groups = self.groups.lock().await;
            let n = groups.len();
            groups.clear();
            n
        };
        let removed = self.registry.deactivate_all().await;
        if dropped > 0 || removed > 0 {
            debug!(groups = dropped, consumers = removed, "groups torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use clickerhub_hub_aggregation::AggregationResult;
    use clickerhub_hub_connection::{ConnectConfig, DisconnectReason};
    use clickerhub_hub_consumers::{ActiveFlag, Consumer, DeliveryFuture, FnFactory};
    use clickerhub_protocol::{ConsumerDescriptor, ConsumerKind, Delimiters};

    type Log = Arc<StdMutex<Vec<(String, AggregationResult)>>>;

    struct Sink {
        descriptor: ConsumerDescriptor,
        group: String,
        active: ActiveFlag,
        log: Log,
    }

    impl Consumer for Sink {
        fn descriptor(&self) -> &ConsumerDescriptor {
            &self.descriptor
        }

        fn set_group_identity(&mut self, group: &str) {
            self.group = group.to_string();
        }

        fn set_question_context(&mut self, _question: &QuestionSpec) {}

        fn set_active_status(&self, active: bool) {
            self.active.set(active);
        }

        fn is_active(&self) -> bool {
            self.active.get()
        }

        fn receive_answers(&self, result: AggregationResult) -> DeliveryFuture<'_> {
            Box::pin(async move {
                self.log.lock().unwrap().push((self.group.clone(), result));
                Ok(())
            })
        }
    }

    async fn register(registry: &ConsumerRegistry, key: &str, kind: ConsumerKind) -> Log {
        let log: Log = Arc::default();
        let sink_log = log.clone();
        registry
            .register(FnFactory::new(
                ConsumerDescriptor::new(key, kind),
                move |d: &ConsumerDescriptor| -> Box<dyn Consumer> {
                    Box::new(Sink {
                        descriptor: d.clone(),
                        group: String::new(),
                        active: ActiveFlag::default(),
                        log: sink_log.clone(),
                    })
                },
            ))
            .await
            .unwrap();
        log
    }

    fn options() -> HubOptions {
        HubOptions {
            delimiters: Delimiters::plain(),
            ..HubOptions::default()
        }
    }

    async fn hub_with(kinds: &[(&str, ConsumerKind)]) -> (Arc<Hub>, Vec<Log>) {
        let registry = Arc::new(ConsumerRegistry::new());
        let mut logs = Vec::new();
        for (key, kind) in kinds {
            logs.push(register(&registry, key, *kind).await);
        }
        let hub = Hub::new(Credentials::new("admin", "hub-1"), registry, options());
        (hub, logs)
    }

    fn last(log: &Log) -> Option<(String, AggregationResult)> {
        log.lock().unwrap().last().cloned()
    }

    const OPEN_YES_NO: &str = "Open;Q1;Agree?;B:Yes,B:No&Tally&G1";

    #[tokio::test]
    async fn count_example_reflects_overwrite() {
        let (hub, logs) = hub_with(&[("Tally", ConsumerKind::Count)]).await;

        hub.handle_line(OPEN_YES_NO).await;
        hub.handle_line("p1;G1;;Yes").await;
        hub.handle_line("p2;G1;;No").await;
        hub.handle_line("p1;G1;;No").await;
        hub.wait_idle().await;

        assert_eq!(logs[0].lock().unwrap().len(), 3);
        // Deliveries race each other, so compare against the final state.
        let expected =
            AggregationResult::Count(BTreeMap::from([("Yes".into(), 0), ("No".into(), 2)]));
        assert!(
            logs[0]
                .lock()
                .unwrap()
                .iter()
                .any(|(g, r)| g == "G1" && r == &expected)
        );
    }

    #[tokio::test]
    async fn average_example_skips_non_numeric() {
        let (hub, logs) = hub_with(&[("Mean", ConsumerKind::Average)]).await;

        hub.handle_line("Open;Q2;How many?;&Mean&G1").await;
        hub.handle_line("p1;G1;;3").await;
        hub.wait_idle().await;
        hub.handle_line("p2;G1;;5").await;
        hub.wait_idle().await;
        hub.handle_line("p3;G1;;lots").await;
        hub.wait_idle().await;

        let (_, result) = last(&logs[0]).unwrap();
        assert_eq!(result, AggregationResult::Average(BTreeMap::from([(0, 4.0)])));
    }

    #[tokio::test]
    async fn answers_for_unopened_or_closed_groups_are_dropped() {
        let (hub, logs) = hub_with(&[("Tally", ConsumerKind::Count)]).await;

        hub.handle_line("p1;G1;;Yes").await;
        assert!(hub.open_groups().await.is_empty());

        hub.handle_line(OPEN_YES_NO).await;
        assert_eq!(hub.open_groups().await, vec!["G1".to_string()]);
        hub.handle_line("Close;G1").await;
        assert!(hub.open_groups().await.is_empty());
        assert!(!hub.registry().has_active("G1").await);

        hub.handle_line("p1;G1;;Yes").await;
        hub.wait_idle().await;
        assert!(logs[0].lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopen_replaces_question_and_clears_answers() {
        let (hub, logs) = hub_with(&[("Tally", ConsumerKind::Count)]).await;

        hub.handle_line(OPEN_YES_NO).await;
        hub.handle_line("p1;G1;;Yes").await;
        hub.wait_idle().await;

        hub.handle_line("Open;Q2;Color?;COMBO:Color:Red~Blue&Tally&G1").await;
        hub.handle_line("p2;G1;;Red").await;
        hub.wait_idle().await;

        let (_, result) = last(&logs[0]).unwrap();
        assert_eq!(
            result,
            AggregationResult::Count(BTreeMap::from([("Red".into(), 1), ("Blue".into(), 0)]))
        );
        assert_eq!(hub.registry().active_for_group("G1").await.len(), 1);
    }

    #[tokio::test]
    async fn one_open_serves_several_groups_independently() {
        let (hub, logs) = hub_with(&[("Echo", ConsumerKind::All)]).await;

        hub.handle_line("Open;Q1;Say;B:Go&Echo&G1,G2").await;
        hub.handle_line("p1;G1;;Go").await;
        hub.wait_idle().await;
        hub.handle_line("p2;G2;;Stop").await;
        hub.wait_idle().await;

        let log = logs[0].lock().unwrap().clone();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "G1");
        assert_eq!(log[1].0, "G2");
        let AggregationResult::All { participant, .. } = &log[1].1 else {
            panic!("expected all");
        };
        assert_eq!(participant, "p2");
    }

    #[tokio::test]
    async fn disabled_consumers_are_not_instantiated() {
        let (hub, logs) =
            hub_with(&[("Echo", ConsumerKind::All), ("Tally", ConsumerKind::Count)]).await;
        hub.set_consumer_enabled("Tally", false).await.unwrap();
        assert_eq!(hub.list_available_consumer_keys().await, vec!["Echo".to_string()]);

        hub.handle_line("Open;Q1;Agree?;B:Yes&Echo,Tally&G1").await;
        hub.handle_line("p1;G1;;Yes").await;
        hub.wait_idle().await;

        assert_eq!(logs[0].lock().unwrap().len(), 1);
        assert!(logs[1].lock().unwrap().is_empty());
        assert!(hub.set_consumer_enabled("Ghost", true).await.is_err());
    }

    #[tokio::test]
    async fn malformed_lines_are_ignored() {
        let (hub, _) = hub_with(&[("Tally", ConsumerKind::Count)]).await;
        hub.handle_line("Open;Q1;no groups").await;
        hub.handle_line("Close").await;
        hub.handle_line("p1;G1").await;
        hub.handle_line("").await;
        assert!(hub.open_groups().await.is_empty());
    }

    #[tokio::test]
    async fn empty_address_is_rejected() {
        let (hub, _) = hub_with(&[]).await;
        assert!(matches!(
            hub.set_server_address("  ").await,
            Err(HubError::NoAddress)
        ));
    }

    async fn read_handshake(
        listener: &TcpListener,
    ) -> (
        tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        tokio::net::tcp::OwnedWriteHalf,
        String,
        String,
    ) {
        let (sock, _) = listener.accept().await.unwrap();
        let (r, w) = sock.into_split();
        let mut lines = BufReader::new(r).lines();
        let login = lines.next_line().await.unwrap().unwrap();
        let announce = lines.next_line().await.unwrap().unwrap();
        (lines, w, login, announce)
    }

    #[tokio::test]
    async fn stale_disconnect_leaves_current_session_alone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = Arc::new(ConsumerRegistry::new());
        register(&registry, "Tally", ConsumerKind::Count).await;
        let hub = Hub::new(
            Credentials::new("admin", "hub-1"),
            registry,
            HubOptions {
                delimiters: Delimiters::plain(),
                connect: ConnectConfig {
                    login_port: listener.local_addr().unwrap().port(),
                    retry_backoff: Duration::from_millis(10),
                    ..ConnectConfig::default()
                },
                ..HubOptions::default()
            },
        );

        let (first, connect) =
            tokio::join!(read_handshake(&listener), hub.set_server_address("127.0.0.1"));
        connect.unwrap();
        let (second, connect) =
            tokio::join!(read_handshake(&listener), hub.set_server_address("127.0.0.1"));
        connect.unwrap();
        drop(first);
        let current = hub.connection().current_connection().await.unwrap();

        hub.handle_line(OPEN_YES_NO).await;
        hub.handle_event(ConnectionEvent::Disconnected {
            connection: current - 1,
            reason: DisconnectReason::EndOfStream,
        })
        .await;

        assert_eq!(hub.open_groups().await, vec!["G1".to_string()]);
        assert_eq!(hub.connection().current_connection().await, Some(current));
        assert!(hub.connection().is_connected());

        // The live connection's own disconnect still tears down and logs in again.
        let (third, ()) = tokio::join!(
            read_handshake(&listener),
            hub.handle_event(ConnectionEvent::Disconnected {
                connection: current,
                reason: DisconnectReason::EndOfStream,
            })
        );
        assert_eq!(third.2, "admin,hub-1");
        assert!(hub.open_groups().await.is_empty());
        assert_ne!(hub.connection().current_connection().await, Some(current));

        drop((second, third));
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn end_to_end_with_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = Arc::new(ConsumerRegistry::new());
        let log = register(&registry, "Tally", ConsumerKind::Count).await;
        let hub = Hub::new(
            Credentials::new("admin", "hub-1"),
            registry,
            HubOptions {
                delimiters: Delimiters::plain(),
                connect: ConnectConfig {
                    login_port: listener.local_addr().unwrap().port(),
                    retry_backoff: Duration::from_millis(10),
                    ..ConnectConfig::default()
                },
                ..HubOptions::default()
            },
        );
        let run = hub.spawn();

        let (server, connect) = tokio::join!(read_handshake(&listener), hub.set_server_address("127.0.0.1"));
        connect.unwrap();
        let (_lines, mut w, login, announce) = server;
        assert_eq!(login, "admin,hub-1");
        assert_eq!(announce, "IConsume;Tally");

        w.write_all(format!("{OPEN_YES_NO}\np1;G1;;Yes\n").as_bytes())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while log.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("delivery");
        assert_eq!(hub.open_groups().await, vec!["G1".to_string()]);

        // Server drops the session; the hub tears down and logs in again.
        drop(w);
        drop(_lines);
        let (_lines2, _w2, login2, _) =
            tokio::time::timeout(Duration::from_secs(5), read_handshake(&listener))
                .await
                .expect("reconnect");
        assert_eq!(login2, "admin,hub-1");
        assert!(hub.open_groups().await.is_empty());

        hub.shutdown().await;
        run.await.unwrap().unwrap();
    }
}
