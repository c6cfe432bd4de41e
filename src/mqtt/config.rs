use std::time::Duration;

use rumqttc::{MqttOptions, Transport};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const DEFAULT_BROKER_URL: &str = "wss://broker.hivemq.com:8884/mqtt";
pub const FOOD_READY_TOPIC: &str = "osensa/table/+/food";
pub const ORDER_TOPIC: &str = "osensa/orders";

/// Broker connection and topic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// `scheme://host[:port][/path]`, see [`BrokerAddress::parse`]
    pub broker_url: String,
    /// Empty means a random id is generated on every connect
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Capacity of the rumqttc request queue and of the worker channels
    pub channel_capacity: usize,
    pub food_ready_topic: String,
    pub order_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            client_id: String::new(),
            keep_alive_secs: 30,
            channel_capacity: 100,
            food_ready_topic: FOOD_READY_TOPIC.to_string(),
            order_topic: ORDER_TOPIC.to_string(),
        }
    }
}

impl MqttConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        BrokerAddress::parse(&self.broker_url)?;
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.channel_capacity must be greater than zero".to_string(),
            ));
        }
        // rumqttc refuses keep alive intervals below five seconds
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.order_topic.is_empty() || self.food_ready_topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt topics must not be empty".to_string()));
        }
        Ok(())
    }

    /// The configured client id, or a random one when none is set.
    pub fn effective_client_id(&self, prefix: &str) -> String {
        if self.client_id.is_empty() {
            format!("{}-{:08x}", prefix, rand::random::<u32>())
        } else {
            self.client_id.clone()
        }
    }

    /// Builds the rumqttc options for this configuration.
    pub fn mqtt_options(&self, client_id: String) -> Result<MqttOptions, ConfigError> {
        let address = BrokerAddress::parse(&self.broker_url)?;
        let mut options = MqttOptions::new(client_id, address.host_for_options(), address.port);
        options
            .set_keep_alive(Duration::from_secs(self.keep_alive_secs))
            .set_clean_session(true)
            .set_transport(address.scheme.transport());
        Ok(options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    fn from_name(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => Some(Scheme::Tcp),
            "mqtts" | "ssl" => Some(Scheme::Tls),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }

    fn default_port(self) -> u16 {
        match self {
            Scheme::Tcp => 1883,
            Scheme::Tls => 8883,
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }

    fn transport(self) -> Transport {
        match self {
            Scheme::Tcp => Transport::Tcp,
            Scheme::Tls => Transport::tls_with_default_config(),
            Scheme::Ws => Transport::Ws,
            Scheme::Wss => Transport::wss_with_default_config(),
        }
    }

    fn is_websocket(self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

/// Parsed broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Websocket path including the leading slash, empty for plain MQTT
    pub path: String,
    raw: String,
}

impl BrokerAddress {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBrokerUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = Scheme::from_name(scheme).ok_or_else(|| invalid("unsupported scheme"))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                (host, port)
            }
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(BrokerAddress {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
            raw: url.to_string(),
        })
    }

    // rumqttc expects the complete URL as the host for websocket transports.
    fn host_for_options(&self) -> String {
        if self.scheme.is_websocket() {
            self.raw.clone()
        } else {
            self.host.clone()
        }
    }
}
