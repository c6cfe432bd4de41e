//! # Restaurant State
//!
//! In-memory view of the dining room: a fixed set of tables and the food
//! items that have been delivered to each of them, plus the broker
//! connectivity flag.
//!
//! The data types in this module are plain values. All mutation goes through
//! [`RestaurantStore`], which publishes every change over a `watch` channel so
//! renderers can observe the state without being coupled to the code that
//! mutates it.
//!
//! ```text
//! MqttHandler ──mutates──► RestaurantStore ──watch──► console / any observer
//! ```

pub mod store;

pub use store::RestaurantStore;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of tables in the dining room. Table ids run from 1 to this value.
pub const TABLE_COUNT: u32 = 4;

/// Identifier of a table, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TableId {
    fn from(id: u32) -> Self {
        TableId(id)
    }
}

/// Identifier of a delivered food item.
///
/// Derived from the wall clock in milliseconds. Unique within one store, not
/// across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FoodId(pub i64);

/// A food item that the kitchen reported as ready for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: FoodId,
    pub name: String,
}

/// A table and the food delivered to it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub food_items: Vec<FoodItem>,
}

impl Table {
    pub fn new(id: TableId) -> Self {
        Table {
            id,
            food_items: Vec::new(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.food_items.is_empty() {
            return write!(f, "Table {}: (nothing yet)", self.id);
        }
        let names: Vec<&str> = self.food_items.iter().map(|i| i.name.as_str()).collect();
        write!(f, "Table {}: {}", self.id, names.join(", "))
    }
}

/// Snapshot of everything the frontend renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantState {
    pub tables: Vec<Table>,
    pub is_connected: bool,
}

impl Default for RestaurantState {
    fn default() -> Self {
        RestaurantState {
            tables: (1..=TABLE_COUNT).map(|id| Table::new(TableId(id))).collect(),
            is_connected: false,
        }
    }
}

impl RestaurantState {
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.id == id)
    }

    /// Highest food id handed out so far. Each table's list is in arrival
    /// order, so only the last item of each table has to be inspected.
    fn last_food_id(&self) -> Option<FoodId> {
        self.tables
            .iter()
            .filter_map(|t| t.food_items.last())
            .map(|item| item.id)
            .max()
    }
}
