//! Seam between the messaging logic and the rumqttc client.
//!
//! [`BrokerClient`] covers the three requests the application issues, and
//! [`Connector`] creates a client whose events are forwarded as
//! [`ClientEvent`]s. The production implementations wrap
//! `rumqttc::AsyncClient` and its `EventLoop`; tests substitute recording
//! implementations.

use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message::{MessageError, MqttMessage};
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("client request failed: {0}")]
    Client(#[from] ClientError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not encode message: {0}")]
    Message(#[from] MessageError),

    #[error("worker is not running")]
    WorkerGone,
}

/// Requests issued to a broker connection.
///
/// All methods only enqueue the request; acknowledgments arrive later as
/// [`ClientEvent`]s.
pub trait BrokerClient: Send + Sync {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError>;
    fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), MqttError>;
    fn disconnect(&self) -> Result<(), MqttError>;
}

impl BrokerClient for AsyncClient {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        Ok(self.try_subscribe(topic, qos)?)
    }

    fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), MqttError> {
        Ok(self.try_publish(topic, qos, false, payload)?)
    }

    fn disconnect(&self) -> Result<(), MqttError> {
        Ok(self.try_disconnect()?)
    }
}

/// Creates broker connections.
pub trait Connector: Send {
    type Client: BrokerClient;

    /// Starts a connection attempt. Every event of the new connection is
    /// sent to `events`, in transport order.
    fn connect(&self, config: &MqttConfig, events: EventSink) -> Result<Self::Client, MqttError>;
}

/// Connects through rumqttc and runs its event loop on the tokio runtime.
#[derive(Debug, Clone)]
pub struct RumqttConnector {
    client_id_prefix: String,
}

impl RumqttConnector {
    pub fn new(client_id_prefix: impl Into<String>) -> Self {
        RumqttConnector {
            client_id_prefix: client_id_prefix.into(),
        }
    }
}

impl Connector for RumqttConnector {
    type Client = AsyncClient;

    fn connect(&self, config: &MqttConfig, events: EventSink) -> Result<AsyncClient, MqttError> {
        let client_id = config.effective_client_id(&self.client_id_prefix);
        let options = config.mqtt_options(client_id.clone())?;
        info!(
            "MQTT: Connecting to {} as {}",
            config.broker_url, client_id
        );

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
        tokio::spawn(run_event_loop(eventloop, events));
        Ok(client)
    }
}

/// Connection events the application reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    SubscribeSent(u16),
    /// `granted` is `None` when the broker refused the subscription
    SubscribeAck { pkid: u16, granted: Option<QoS> },
    PublishSent(u16),
    /// QoS 2 handshake for an outgoing publish finished
    PublishComplete(u16),
    Message(MqttMessage),
    Error(String),
    Disconnected,
}

impl ClientEvent {
    /// Events after which the connection delivers nothing more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClientEvent::Error(_) | ClientEvent::Disconnected)
    }
}

/// A [`ClientEvent`] tagged with the connection attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub connection: u64,
    pub event: ClientEvent,
}

/// Sending half of an event channel, bound to one connection attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    connection: u64,
    tx: mpsc::Sender<ConnectionEvent>,
}

impl EventSink {
    pub fn new(connection: u64, tx: mpsc::Sender<ConnectionEvent>) -> Self {
        EventSink { connection, tx }
    }

    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// Hands the event back when the receiver is gone.
    pub async fn send(&self, event: ClientEvent) -> Result<(), ClientEvent> {
        self.tx
            .send(ConnectionEvent {
                connection: self.connection,
                event,
            })
            .await
            .map_err(|e| e.0.event)
    }
}

/// Maps a rumqttc event to the events the application cares about.
pub fn translate(event: Event) -> Option<ClientEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => match ack.code {
            ConnectReturnCode::Success => Some(ClientEvent::Connected),
            code => Some(ClientEvent::Error(format!("connection refused: {:?}", code))),
        },
        Event::Incoming(Packet::SubAck(ack)) => {
            let granted = match ack.return_codes.first() {
                Some(SubscribeReasonCode::Success(qos)) => Some(*qos),
                _ => None,
            };
            Some(ClientEvent::SubscribeAck {
                pkid: ack.pkid,
                granted,
            })
        }
        Event::Incoming(Packet::PubComp(comp)) => Some(ClientEvent::PublishComplete(comp.pkid)),
        Event::Incoming(Packet::Publish(publish)) => Some(ClientEvent::Message(MqttMessage::new(
            publish.topic,
            publish.payload.to_vec(),
        ))),
        Event::Outgoing(Outgoing::Subscribe(pkid)) => Some(ClientEvent::SubscribeSent(pkid)),
        Event::Outgoing(Outgoing::Publish(pkid)) => Some(ClientEvent::PublishSent(pkid)),
        Event::Outgoing(Outgoing::Disconnect) => Some(ClientEvent::Disconnected),
        _ => None,
    }
}

/// Polls the rumqttc event loop until the connection fails or is closed.
///
/// The loop does not reconnect. After an error the client handle stays
/// around but every further request fails.
pub async fn run_event_loop(mut eventloop: EventLoop, events: EventSink) {
    debug!("MQTT event loop {} started", events.connection());
    loop {
        let event = match eventloop.poll().await {
            Ok(event) => match translate(event) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                error!("MQTT Connection Error: {}", e);
                ClientEvent::Error(e.to_string())
            }
        };

        let terminal = event.is_terminal();
        if events.send(event).await.is_err() {
            warn!("MQTT event receiver dropped, stopping event loop");
            break;
        }
        if terminal {
            break;
        }
    }
    // Dropping the loop closes the request queue, so later requests on the
    // client fail instead of piling up.
    drop(eventloop);
    debug!("MQTT event loop {} stopped", events.connection());
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording doubles for [`BrokerClient`] and [`Connector`].

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Subscribe { topic: String, qos: QoS },
        Publish { topic: String, qos: QoS, payload: Vec<u8> },
        Disconnect,
    }

    #[derive(Debug, Clone, Default)]
    pub struct RecordingClient {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl RecordingClient {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn publishes(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, Call::Publish { .. }))
                .collect()
        }

        /// Makes every following request fail like a closed request queue.
        pub fn fail_requests(&self) {
            *self.fail.lock().unwrap() = true;
        }

        fn record(&self, call: Call) -> Result<(), MqttError> {
            if *self.fail.lock().unwrap() {
                return Err(MqttError::WorkerGone);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl BrokerClient for RecordingClient {
        fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
            self.record(Call::Subscribe {
                topic: topic.to_string(),
                qos,
            })
        }

        fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), MqttError> {
            self.record(Call::Publish {
                topic: topic.to_string(),
                qos,
                payload,
            })
        }

        fn disconnect(&self) -> Result<(), MqttError> {
            self.record(Call::Disconnect)
        }
    }

    /// Hands out one shared [`RecordingClient`] and counts connection attempts.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingConnector {
        pub client: RecordingClient,
        attempts: Arc<Mutex<usize>>,
        events: Arc<Mutex<Option<EventSink>>>,
    }

    impl RecordingConnector {
        pub fn attempts(&self) -> usize {
            *self.attempts.lock().unwrap()
        }

        /// Sender the last connection attempt was wired to.
        pub fn events(&self) -> Option<EventSink> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Connector for RecordingConnector {
        type Client = RecordingClient;

        fn connect(
            &self,
            _config: &MqttConfig,
            events: EventSink,
        ) -> Result<RecordingClient, MqttError> {
            *self.attempts.lock().unwrap() += 1;
            *self.events.lock().unwrap() = Some(events);
            Ok(self.client.clone())
        }
    }
}
