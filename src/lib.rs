//! Table ordering frontend glue: keeps an observable view of the restaurant
//! tables in sync with an MQTT broker and sends table orders to the kitchen.

pub mod config;
pub mod console;
pub mod context;
pub mod kitchen;
pub mod mqtt;
pub mod setup;
pub mod state;

pub use config::{AppConfig, ConfigError};
pub use context::RestaurantContext;
pub use state::{FoodItem, RestaurantState, RestaurantStore, Table, TableId};
