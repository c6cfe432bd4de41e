//! # MQTT Integration
//!
//! Connects the restaurant state to the broker. Tables receive ready-food
//! messages on `osensa/table/{id}/food` and send orders to `osensa/orders`,
//! both with exactly-once delivery.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - Broker URL, client id and topic settings
//! ├── message.rs       - Payload types and topic parsing
//! ├── client.rs        - BrokerClient/Connector seam over rumqttc
//! └── mqtt_handler.rs  - Connection state machine and worker handle
//! ```
//!
//! The [`mqtt_handler::MqttHandler`] owns the single client handle and only
//! ever runs on one task, so the handle and the connectivity flag need no
//! locking. [`mqtt_handler::MqttHandle`] is the cheap front end other tasks
//! use to send requests to it.

pub mod client;
pub mod config;
pub mod message;
pub mod mqtt_handler;

pub use client::{
    BrokerClient, ClientEvent, ConnectionEvent, Connector, EventSink, MqttError, RumqttConnector,
};
pub use config::MqttConfig;
pub use mqtt_handler::{ConnectionState, MqttHandle, MqttHandler, MqttStatus};
