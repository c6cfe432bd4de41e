//! # Kitchen Simulator
//!
//! Counterpart of the table frontend. Listens for orders on the order topic,
//! cooks each one for a random time and then announces the food as ready on
//! `osensa/table/{id}/food`.

use std::time::Duration;

use rand::Rng;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::mqtt::message::{food_ready_topic, MessageError, MqttMessage, OrderRequest, ReadyFood};
use crate::mqtt::{BrokerClient, ClientEvent, MqttError};

#[derive(Debug, Error)]
pub enum KitchenError {
    #[error("failed to publish to {topic}: {source}")]
    Publish { topic: String, source: MqttError },

    #[error("failed to encode ready food: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KitchenConfig {
    pub min_cook_secs: f64,
    pub max_cook_secs: f64,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        KitchenConfig {
            min_cook_secs: 5.0,
            max_cook_secs: 15.0,
        }
    }
}

impl KitchenConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = self.min_cook_secs.is_finite()
            && self.max_cook_secs.is_finite()
            && self.min_cook_secs >= 0.0
            && self.min_cook_secs <= self.max_cook_secs;
        if valid {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "kitchen cook time range {}..{} is invalid",
                self.min_cook_secs, self.max_cook_secs
            )))
        }
    }

    pub fn cook_time(&self) -> Duration {
        if self.validate().is_err() {
            return Duration::from_secs_f64(KitchenConfig::default().min_cook_secs);
        }
        let secs = rand::thread_rng().gen_range(self.min_cook_secs..=self.max_cook_secs);
        Duration::from_secs_f64(secs)
    }
}

/// Turns incoming orders into ready-food announcements.
pub struct Kitchen<B> {
    client: B,
    config: KitchenConfig,
    order_topic: String,
    cooks: TaskTracker,
    closing: CancellationToken,
}

impl<B> Kitchen<B>
where
    B: BrokerClient + Clone + 'static,
{
    pub fn new(client: B, config: KitchenConfig, order_topic: impl Into<String>) -> Self {
        Kitchen {
            client,
            config,
            order_topic: order_topic.into(),
            cooks: TaskTracker::new(),
            closing: CancellationToken::new(),
        }
    }

    pub fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                info!("MQTT: Connected to Broker.");
                match self.client.subscribe(&self.order_topic, QoS::ExactlyOnce) {
                    Ok(()) => info!("MQTT: Subscribed to listener topic: {}", self.order_topic),
                    Err(e) => error!("MQTT: Could not subscribe to {}: {}", self.order_topic, e),
                }
            }
            ClientEvent::SubscribeAck { granted: None, .. } => {
                error!("MQTT: Broker refused subscription to {}", self.order_topic);
            }
            ClientEvent::Message(message) => self.handle_order(message),
            ClientEvent::Error(reason) => error!("MQTT: Connection error: {}", reason),
            other => debug!("MQTT: {:?}", other),
        }
    }

    fn handle_order(&self, message: MqttMessage) {
        if message.topic != self.order_topic {
            info!("MQTT: Ignoring message on unexpected topic {}", message.topic);
            return;
        }

        let order = match OrderRequest::from_payload(&message.payload) {
            Ok(order) => order,
            Err(MessageError::MalformedPayload(e)) => {
                error!(
                    "MQTT: Failed to decode JSON from order message: {} ({})",
                    message.payload_text(),
                    e
                );
                return;
            }
            Err(e) => {
                warn!(
                    "MQTT: Received invalid order payload: {} ({})",
                    message.payload_text(),
                    e
                );
                return;
            }
        };

        let cook_time = self.config.cook_time();
        info!(
            "Chef started cooking: {} for Table {}. ETA: {:.2}s.",
            order.food_name,
            order.table_id,
            cook_time.as_secs_f64()
        );

        let client = self.client.clone();
        let closing = self.closing.clone();
        self.cooks.spawn(async move {
            tokio::select! {
                _ = closing.cancelled() => {
                    debug!("Cooking {} for Table {} abandoned", order.food_name, order.table_id);
                }
                result = cook_food(order.table_id, &order.food_name, &client, cook_time) => {
                    if let Err(e) = result {
                        error!("Chef error: {}", e);
                    }
                }
            }
        });
    }

    /// Number of orders still being cooked.
    pub fn cooking(&self) -> usize {
        self.cooks.len()
    }

    /// Abandons unfinished orders and waits for their tasks to end.
    pub async fn close(&self) {
        self.closing.cancel();
        self.cooks.close();
        self.cooks.wait().await;
    }
}

/// Waits `cook_time`, then announces `food_name` as ready for `table_id`.
pub async fn cook_food<B: BrokerClient>(
    table_id: i64,
    food_name: &str,
    client: &B,
    cook_time: Duration,
) -> Result<(), KitchenError> {
    tokio::time::sleep(cook_time).await;

    let topic = food_ready_topic(table_id);
    let payload = serde_json::to_vec(&ReadyFood {
        food_name: food_name.to_string(),
    })?;
    client
        .publish(&topic, QoS::ExactlyOnce, payload)
        .map_err(|source| KitchenError::Publish {
            topic: topic.clone(),
            source,
        })?;

    info!("Chef finished: Published '{}' to {}.", food_name, topic);
    Ok(())
}
