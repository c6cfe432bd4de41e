use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::QoS;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{BrokerClient, ClientEvent, ConnectionEvent, Connector, EventSink, MqttError};
use super::config::MqttConfig;
use super::message::{parse_ready_food, MqttMessage, Order};
use crate::state::{RestaurantStore, TableId};

/// How long shutdown waits for the broker to confirm the disconnect.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Both subscriptions and orders use exactly-once delivery.
const DELIVERY_QOS: QoS = QoS::ExactlyOnce;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Connecting,
    Connected,
    Subscribed,
    Error,
    Disconnected,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub messages_dropped: usize,
    pub orders_sent: usize,
    pub orders_failed: usize,
    pub last_activity: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

/// Bridges the broker connection and the [`RestaurantStore`].
///
/// Runs on a single task: the caller drives it with requests
/// (`connect_and_subscribe`, `publish_order`, `disconnect`) and feeds every
/// [`ConnectionEvent`] into [`MqttHandler::handle_connection_event`].
/// Nothing here returns an error to the caller; failures are logged and
/// show up in the connectivity flag and in [`MqttStatus`].
pub struct MqttHandler<C: Connector> {
    config: MqttConfig,
    connector: C,
    store: RestaurantStore,
    client: Option<C::Client>,
    // Incremented for every connection attempt; events tagged with an older
    // value belong to a client that was already released.
    connection: u64,
    events: mpsc::Sender<ConnectionEvent>,
    status: watch::Sender<MqttStatus>,
    disconnecting: bool,
    // Orders handed to the client but not yet written. rumqttc writes
    // requests in order, so the next PublishSent belongs to the front entry.
    queued_orders: VecDeque<Order>,
    in_flight: HashMap<u16, Order>,
}

impl<C: Connector> MqttHandler<C> {
    pub fn new(
        config: MqttConfig,
        connector: C,
        store: RestaurantStore,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let (status, _) = watch::channel(MqttStatus::default());
        MqttHandler {
            config,
            connector,
            store,
            client: None,
            connection: 0,
            events,
            status,
            disconnecting: false,
            queued_orders: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }

    pub fn status(&self) -> MqttStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MqttStatus> {
        self.status.subscribe()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Starts a connection unless a client handle already exists.
    ///
    /// An existing handle is never replaced, even when its connection
    /// failed; `disconnect` has to be called first in that case.
    pub fn connect_and_subscribe(&mut self) {
        if self.client.is_some() {
            if self.connection_state() == ConnectionState::Error {
                warn!("MQTT: Client is in error state and will not reconnect; disconnect first");
            } else {
                debug!("MQTT: Client already initialized, ignoring connect request");
            }
            return;
        }

        self.connection += 1;
        let sink = EventSink::new(self.connection, self.events.clone());
        match self.connector.connect(&self.config, sink) {
            Ok(client) => {
                self.client = Some(client);
                self.set_state(ConnectionState::Connecting);
            }
            Err(e) => {
                error!("MQTT: Could not create client: {}", e);
                self.record_error(e.to_string());
                self.set_state(ConnectionState::Error);
            }
        }
    }

    /// Publishes an order to the kitchen when connected.
    pub fn publish_order(&mut self, table_id: TableId, food_name: impl Into<String>) {
        let Some(client) = self.client.as_ref() else {
            error!("Cannot publish: client is not connected.");
            return;
        };
        if !self.store.is_connected() {
            error!("Cannot publish: client is not connected.");
            return;
        }

        let order = Order::new(table_id, food_name);
        let result = order
            .to_payload()
            .map_err(MqttError::from)
            .and_then(|payload| client.publish(&self.config.order_topic, DELIVERY_QOS, payload));

        match result {
            Ok(()) => {
                debug!(
                    "MQTT: Queued order from Table {}: {}",
                    order.table_id, order.food_name
                );
                self.queued_orders.push_back(order);
            }
            Err(e) => {
                error!("MQTT Publish Error: {}", e);
                self.record_error(e.to_string());
                self.status.send_modify(|s| s.orders_failed += 1);
            }
        }
    }

    /// Requests a graceful disconnect. The handle is released once the
    /// connection confirms it.
    pub fn disconnect(&mut self) {
        let Some(client) = self.client.as_ref() else {
            debug!("MQTT: No client, nothing to disconnect");
            return;
        };

        info!("MQTT: Disconnecting from Broker...");
        match client.disconnect() {
            Ok(()) => self.disconnecting = true,
            Err(e) => {
                // Event loop already stopped, nobody will confirm.
                debug!("MQTT: Disconnect request not delivered ({}), closing locally", e);
                self.complete_disconnect();
            }
        }
    }

    /// Applies an event unless it comes from an earlier connection attempt.
    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        if event.connection != self.connection {
            debug!(
                "MQTT: Ignoring {:?} from stale connection {}",
                event.event, event.connection
            );
            return;
        }
        self.handle_event(event.event);
    }

    /// Applies an event of the current connection. Without a client handle
    /// there is no current connection and the event is dropped.
    pub fn handle_event(&mut self, event: ClientEvent) {
        if self.client.is_none() {
            debug!("MQTT: Ignoring {:?}, no client", event);
            return;
        }
        match event {
            ClientEvent::Connected => self.on_connected(),
            ClientEvent::SubscribeSent(pkid) => {
                debug!("MQTT: Subscribe request {} sent", pkid);
            }
            ClientEvent::SubscribeAck { pkid, granted } => self.on_subscribe_ack(pkid, granted),
            ClientEvent::PublishSent(pkid) => match self.queued_orders.pop_front() {
                Some(order) => {
                    self.in_flight.insert(pkid, order);
                }
                None => debug!("MQTT: Publish {} sent without a queued order", pkid),
            },
            ClientEvent::PublishComplete(pkid) => match self.in_flight.remove(&pkid) {
                Some(order) => {
                    info!(
                        "MQTT: Published order from Table {}: {}",
                        order.table_id, order.food_name
                    );
                    self.status.send_modify(|s| {
                        s.orders_sent += 1;
                        s.last_activity = Some(Local::now());
                    });
                }
                None => debug!("MQTT: Completion for unknown publish {}", pkid),
            },
            ClientEvent::Message(message) => self.on_message(message),
            ClientEvent::Error(reason) => self.on_error(reason),
            ClientEvent::Disconnected => self.complete_disconnect(),
        }
    }

    fn on_connected(&mut self) {
        info!("MQTT: Connected to Broker, Subscribing to food-ready topics...");
        self.store.set_connection_status(true);
        self.set_state(ConnectionState::Connected);

        let Some(client) = self.client.as_ref() else {
            warn!("MQTT: Connected event without a client");
            return;
        };
        if let Err(e) = client.subscribe(&self.config.food_ready_topic, DELIVERY_QOS) {
            error!("MQTT Subscription Error: {}", e);
            self.record_error(e.to_string());
        }
    }

    fn on_subscribe_ack(&mut self, pkid: u16, granted: Option<QoS>) {
        match granted {
            Some(qos) => {
                info!(
                    "MQTT: Connected, Subscribed to food-ready topics! (pkid {}, {:?})",
                    pkid, qos
                );
                self.set_state(ConnectionState::Subscribed);
            }
            None => {
                error!(
                    "MQTT Subscription Error: broker refused {}",
                    self.config.food_ready_topic
                );
                self.record_error(format!(
                    "subscription to {} refused",
                    self.config.food_ready_topic
                ));
            }
        }
    }

    fn on_message(&mut self, message: MqttMessage) {
        self.status.send_modify(|s| {
            s.messages_received += 1;
            s.last_activity = Some(message.received_at);
        });

        match parse_ready_food(&message.topic, &message.payload) {
            Ok((table_id, food)) => {
                self.store.add_food_to_table(table_id, food.food_name);
            }
            Err(e) => {
                error!(
                    "MQTT Message Processing Error: {} Payload: {}",
                    e,
                    message.payload_text()
                );
                self.status.send_modify(|s| s.messages_dropped += 1);
            }
        }
    }

    fn on_error(&mut self, reason: String) {
        error!("MQTT Connection Error: {}", reason);
        self.store.set_connection_status(false);
        self.record_error(reason);
        self.fail_pending_orders();

        if self.disconnecting {
            self.complete_disconnect();
        } else {
            self.set_state(ConnectionState::Error);
        }
    }

    fn complete_disconnect(&mut self) {
        self.client = None;
        self.disconnecting = false;
        self.fail_pending_orders();
        self.store.set_connection_status(false);
        self.set_state(ConnectionState::Disconnected);
        info!("MQTT: Disconnected from Broker");
    }

    fn fail_pending_orders(&mut self) {
        let pending: Vec<Order> = self
            .queued_orders
            .drain(..)
            .chain(self.in_flight.drain().map(|(_, order)| order))
            .collect();
        if pending.is_empty() {
            return;
        }
        for order in &pending {
            error!(
                "MQTT Publish Error: order from Table {} for {} was not confirmed",
                order.table_id, order.food_name
            );
        }
        self.status.send_modify(|s| s.orders_failed += pending.len());
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_if_modified(|s| {
            let changed = s.connection_state != state;
            s.connection_state = state;
            changed
        });
    }

    fn record_error(&self, reason: String) {
        self.status.send_modify(|s| s.last_error = Some(reason));
    }
}

#[derive(Debug)]
pub enum MqttCommand {
    ConnectAndSubscribe,
    PublishOrder(Order),
    Disconnect,
}

/// Front end of an [`MqttHandler`] running on its own task.
///
/// Requests are queued to the worker and never report failures back; watch
/// [`MqttHandle::status`] or the store to observe the outcome.
#[derive(Debug)]
pub struct MqttHandle {
    commands: mpsc::Sender<MqttCommand>,
    status: watch::Receiver<MqttStatus>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl MqttHandle {
    pub fn spawn<C>(config: MqttConfig, connector: C, store: RestaurantStore) -> Self
    where
        C: Connector + 'static,
        C::Client: 'static,
    {
        let capacity = config.channel_capacity.max(1);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        let handler = MqttHandler::new(config, connector, store, event_tx);
        let status = handler.subscribe_status();
        let cancel = CancellationToken::new();

        info!("Spawning MQTT worker");
        let worker = tokio::spawn(run_worker(handler, command_rx, event_rx, cancel.clone()));

        MqttHandle {
            commands: command_tx,
            status,
            cancel,
            worker,
        }
    }

    pub async fn connect_and_subscribe(&self) {
        self.send(MqttCommand::ConnectAndSubscribe).await;
    }

    pub async fn publish_order(&self, table_id: TableId, food_name: impl Into<String>) {
        self.send(MqttCommand::PublishOrder(Order::new(table_id, food_name)))
            .await;
    }

    pub async fn disconnect(&self) {
        self.send(MqttCommand::Disconnect).await;
    }

    pub fn status(&self) -> watch::Receiver<MqttStatus> {
        self.status.clone()
    }

    /// Stops the worker after a graceful disconnect.
    pub async fn shutdown(self) {
        info!("Shutting down MQTT worker");
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            error!("MQTT worker terminated abnormally: {}", e);
        }
    }

    async fn send(&self, command: MqttCommand) {
        if let Err(e) = self.commands.send(command).await {
            error!("MQTT worker is gone, dropping {:?}", e.0);
        }
    }
}

async fn run_worker<C: Connector>(
    mut handler: MqttHandler<C>,
    mut commands: mpsc::Receiver<MqttCommand>,
    mut events: mpsc::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    debug!("MQTT worker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(MqttCommand::ConnectAndSubscribe) => handler.connect_and_subscribe(),
                Some(MqttCommand::PublishOrder(order)) => {
                    handler.publish_order(order.table_id, order.food_name)
                }
                Some(MqttCommand::Disconnect) => handler.disconnect(),
                None => break,
            },
            Some(event) = events.recv() => handler.handle_connection_event(event),
        }
    }

    if handler.has_client() {
        handler.disconnect();
        let confirmed = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while handler.has_client() {
                match events.recv().await {
                    Some(event) => handler.handle_connection_event(event),
                    None => break,
                }
            }
        })
        .await
        .is_ok();

        if !confirmed {
            warn!("MQTT: Broker did not confirm disconnect, closing anyway");
            handler.complete_disconnect();
        }
    }
    debug!("MQTT worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::client::testing::{Call, RecordingConnector};
    use crate::mqtt::config::{FOOD_READY_TOPIC, ORDER_TOPIC};

    struct Fixture {
        handler: MqttHandler<RecordingConnector>,
        connector: RecordingConnector,
        store: RestaurantStore,
        _events: mpsc::Receiver<ConnectionEvent>,
    }

    fn fixture() -> Fixture {
        let connector = RecordingConnector::default();
        let store = RestaurantStore::new();
        let (tx, rx) = mpsc::channel(16);
        let handler = MqttHandler::new(MqttConfig::default(), connector.clone(), store.clone(), tx);
        Fixture {
            handler,
            connector,
            store,
            _events: rx,
        }
    }

    fn connected() -> Fixture {
        let mut f = fixture();
        f.handler.connect_and_subscribe();
        f.handler.handle_event(ClientEvent::Connected);
        f
    }

    fn message(topic: &str, payload: &str) -> ClientEvent {
        ClientEvent::Message(MqttMessage::new(topic, payload))
    }

    #[test]
    fn connect_subscribes_to_food_ready_topic() {
        let mut f = fixture();
        f.handler.connect_and_subscribe();

        assert_eq!(f.connector.attempts(), 1);
        assert_eq!(f.handler.connection_state(), ConnectionState::Connecting);
        assert!(!f.store.is_connected());

        f.handler.handle_event(ClientEvent::Connected);

        assert!(f.store.is_connected());
        assert_eq!(f.handler.connection_state(), ConnectionState::Connected);
        assert_eq!(
            f.connector.client.calls(),
            vec![Call::Subscribe {
                topic: FOOD_READY_TOPIC.to_string(),
                qos: QoS::ExactlyOnce,
            }]
        );
    }

    #[test]
    fn second_connect_reuses_existing_handle() {
        let mut f = fixture();
        f.handler.connect_and_subscribe();
        f.handler.connect_and_subscribe();
        assert_eq!(f.connector.attempts(), 1);

        f.handler.handle_event(ClientEvent::Connected);
        f.handler.connect_and_subscribe();
        assert_eq!(f.connector.attempts(), 1);
    }

    #[test]
    fn subscribe_ack_outcomes() {
        let mut f = connected();

        f.handler.handle_event(ClientEvent::SubscribeAck {
            pkid: 1,
            granted: None,
        });
        assert_eq!(f.handler.connection_state(), ConnectionState::Connected);
        assert!(f.handler.status().last_error.is_some());

        f.handler.handle_event(ClientEvent::SubscribeAck {
            pkid: 2,
            granted: Some(QoS::ExactlyOnce),
        });
        assert_eq!(f.handler.connection_state(), ConnectionState::Subscribed);
    }

    #[test]
    fn ready_food_message_reaches_table() {
        let mut f = connected();

        f.handler.handle_event(message("osensa/table/3/food", r#"{"foodName":"Sushi"}"#));

        let table = f.store.table(TableId(3)).expect("table 3");
        assert_eq!(table.food_items.len(), 1);
        assert_eq!(table.food_items[0].name, "Sushi");
        assert_eq!(f.handler.status().messages_received, 1);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let mut f = connected();
        let before = f.store.snapshot();

        f.handler.handle_event(message("osensa/table/5/food", r#"{"invalidName":"Ramen"}"#));
        f.handler.handle_event(message("osensa/table/x/food", r#"{"foodName":"Ramen"}"#));
        f.handler.handle_event(message("osensa/table/2/food", "not json"));
        // valid message for a table that does not exist
        f.handler.handle_event(message("osensa/table/9/food", r#"{"foodName":"Ramen"}"#));

        assert_eq!(f.store.snapshot(), before);
        let status = f.handler.status();
        assert_eq!(status.messages_received, 4);
        assert_eq!(status.messages_dropped, 3);
    }

    #[test]
    fn publish_order_while_connected() {
        let mut f = connected();

        f.handler.publish_order(TableId(3), "Pizza");

        assert_eq!(
            f.connector.client.publishes(),
            vec![Call::Publish {
                topic: ORDER_TOPIC.to_string(),
                qos: QoS::ExactlyOnce,
                payload: br#"{"tableId":3,"foodName":"Pizza"}"#.to_vec(),
            }]
        );
    }

    #[test]
    fn publish_order_requires_connection() {
        let mut f = fixture();
        f.handler.publish_order(TableId(1), "Steak");

        f.handler.connect_and_subscribe();
        f.handler.publish_order(TableId(1), "Steak");

        f.store.set_connection_status(false);
        f.handler.publish_order(TableId(1), "Steak");

        assert!(f.connector.client.publishes().is_empty());
    }

    #[test]
    fn publish_acknowledgments_are_matched_to_orders() {
        let mut f = connected();
        f.handler.publish_order(TableId(1), "Steak");
        f.handler.publish_order(TableId(2), "Salad");

        f.handler.handle_event(ClientEvent::PublishSent(10));
        f.handler.handle_event(ClientEvent::PublishSent(11));
        f.handler.handle_event(ClientEvent::PublishComplete(11));

        assert_eq!(f.handler.status().orders_sent, 1);
        assert_eq!(
            f.handler.in_flight.get(&10),
            Some(&Order::new(TableId(1), "Steak"))
        );

        f.handler.handle_event(ClientEvent::PublishComplete(10));
        f.handler.handle_event(ClientEvent::PublishComplete(99));
        assert_eq!(f.handler.status().orders_sent, 2);
        assert!(f.handler.in_flight.is_empty());
    }

    #[test]
    fn failed_publish_request_is_counted() {
        let mut f = connected();
        f.connector.client.fail_requests();

        f.handler.publish_order(TableId(4), "Tea");

        let status = f.handler.status();
        assert_eq!(status.orders_failed, 1);
        assert!(status.last_error.is_some());
    }

    #[test]
    fn error_clears_flag_but_keeps_handle() {
        let mut f = connected();
        f.handler.publish_order(TableId(2), "Soup");

        f.handler.handle_event(ClientEvent::Error("connection reset".to_string()));

        assert!(!f.store.is_connected());
        assert!(f.handler.has_client());
        assert_eq!(f.handler.connection_state(), ConnectionState::Error);
        assert_eq!(f.handler.status().orders_failed, 1);

        // handle still present, so no new attempt
        f.handler.connect_and_subscribe();
        assert_eq!(f.connector.attempts(), 1);
    }

    #[test]
    fn disconnect_completes_on_confirmation() {
        let mut f = connected();

        f.handler.disconnect();
        assert!(f.handler.has_client());
        assert_eq!(f.connector.client.calls().last(), Some(&Call::Disconnect));

        f.handler.handle_event(ClientEvent::Disconnected);
        assert!(!f.handler.has_client());
        assert!(!f.store.is_connected());
        assert_eq!(f.handler.connection_state(), ConnectionState::Disconnected);

        f.handler.connect_and_subscribe();
        assert_eq!(f.connector.attempts(), 2);
    }

    #[test]
    fn disconnect_without_event_loop_closes_locally() {
        let mut f = connected();
        f.handler.handle_event(ClientEvent::Error("broker gone".to_string()));
        f.connector.client.fail_requests();

        f.handler.disconnect();

        assert!(!f.handler.has_client());
        assert_eq!(f.handler.connection_state(), ConnectionState::Disconnected);

        f.handler.connect_and_subscribe();
        assert_eq!(f.connector.attempts(), 2);
    }

    #[test]
    fn disconnect_without_handle_is_noop() {
        let mut f = fixture();
        f.handler.disconnect();

        assert_eq!(f.handler.connection_state(), ConnectionState::Uninitialized);
        assert!(f.connector.client.calls().is_empty());
    }

    #[test]
    fn error_while_disconnecting_finishes_disconnect() {
        let mut f = connected();
        f.handler.disconnect();

        f.handler.handle_event(ClientEvent::Error("closed".to_string()));

        assert!(!f.handler.has_client());
        assert_eq!(f.handler.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn events_after_local_close_are_ignored() {
        let mut f = connected();
        f.connector.client.fail_requests();
        f.handler.disconnect();
        assert!(!f.handler.has_client());

        // the released event loop may still deliver what it had queued
        f.handler.handle_event(message("osensa/table/2/food", r#"{"foodName":"Ramen"}"#));
        f.handler.handle_event(ClientEvent::Connected);

        assert!(!f.store.is_connected());
        assert_eq!(f.handler.connection_state(), ConnectionState::Disconnected);
        assert!(f
            .store
            .table(TableId(2))
            .is_some_and(|t| t.food_items.is_empty()));
        assert_eq!(f.handler.status().messages_received, 0);
    }

    #[test]
    fn events_from_previous_connection_are_ignored() {
        let mut f = connected();
        let first = f.connector.events().expect("first connection");
        f.handler.disconnect();
        f.handler.handle_event(ClientEvent::Disconnected);

        f.handler.connect_and_subscribe();
        let second = f.connector.events().expect("second connection");
        assert_ne!(first.connection(), second.connection());

        f.handler.handle_connection_event(ConnectionEvent {
            connection: first.connection(),
            event: ClientEvent::Connected,
        });
        assert!(!f.store.is_connected());
        assert_eq!(f.handler.connection_state(), ConnectionState::Connecting);

        f.handler.handle_connection_event(ConnectionEvent {
            connection: second.connection(),
            event: ClientEvent::Connected,
        });
        assert!(f.store.is_connected());

        f.handler.handle_connection_event(ConnectionEvent {
            connection: first.connection(),
            event: message("osensa/table/2/food", r#"{"foodName":"Ramen"}"#),
        });
        f.handler.handle_connection_event(ConnectionEvent {
            connection: second.connection(),
            event: message("osensa/table/3/food", r#"{"foodName":"Sushi"}"#),
        });
        let snapshot = f.store.snapshot();
        assert!(snapshot.tables[1].food_items.is_empty());
        assert_eq!(snapshot.tables[2].food_items.len(), 1);
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn handle_drives_worker() {
        let connector = RecordingConnector::default();
        let store = RestaurantStore::new();
        let handle = MqttHandle::spawn(MqttConfig::default(), connector.clone(), store.clone());

        handle.connect_and_subscribe().await;
        wait_for(|| connector.events().is_some()).await;

        let events = connector.events().expect("connected");
        events.send(ClientEvent::Connected).await.expect("worker alive");
        wait_for(|| store.is_connected()).await;

        events
            .send(message("osensa/table/1/food", r#"{"foodName":"Ramen"}"#))
            .await
            .expect("worker alive");
        wait_for(|| store.table(TableId(1)).map(|t| t.food_items.len()) == Some(1)).await;

        handle.publish_order(TableId(1), "Gyoza").await;
        wait_for(|| connector.client.publishes().len() == 1).await;

        let status = handle.status();
        assert_eq!(status.borrow().connection_state, ConnectionState::Connected);

        handle.shutdown().await;
        assert!(!store.is_connected());
        assert_eq!(connector.client.calls().last(), Some(&Call::Disconnect));
        assert_eq!(
            status.borrow().connection_state,
            ConnectionState::Disconnected
        );
    }
}
