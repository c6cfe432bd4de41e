//! Explicitly constructed application context.
//!
//! Replaces process-wide singletons: each [`RestaurantContext`] owns its own
//! store and messaging worker, so several can live side by side.

use tracing::info;

use crate::mqtt::{Connector, MqttConfig, MqttHandle, RumqttConnector};
use crate::state::RestaurantStore;

const CLIENT_ID_PREFIX: &str = "table-orders";

#[derive(Debug)]
pub struct RestaurantContext {
    pub store: RestaurantStore,
    pub mqtt: MqttHandle,
}

impl RestaurantContext {
    /// Starts a context that talks to the broker through rumqttc.
    pub fn start(config: MqttConfig) -> Self {
        Self::with_connector(config, RumqttConnector::new(CLIENT_ID_PREFIX))
    }

    pub fn with_connector<C>(config: MqttConfig, connector: C) -> Self
    where
        C: Connector + 'static,
        C::Client: 'static,
    {
        let store = RestaurantStore::new();
        let mqtt = MqttHandle::spawn(config, connector, store.clone());
        info!("Restaurant context started");
        RestaurantContext { store, mqtt }
    }

    /// Disconnects from the broker and stops the worker.
    pub async fn shutdown(self) {
        self.mqtt.shutdown().await;
        info!("Restaurant context stopped");
    }
}
