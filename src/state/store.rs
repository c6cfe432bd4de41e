use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{FoodId, FoodItem, RestaurantState, Table, TableId};

/// Observable owner of the [`RestaurantState`].
///
/// Cloning the store is cheap and every clone refers to the same state.
/// Observers call [`RestaurantStore::subscribe`] and get notified after each
/// mutation that actually changed something.
#[derive(Clone, Debug)]
pub struct RestaurantStore {
    sender: Arc<watch::Sender<RestaurantState>>,
}

impl Default for RestaurantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RestaurantStore {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(RestaurantState::default());
        RestaurantStore {
            sender: Arc::new(sender),
        }
    }

    /// Overwrites the connectivity flag.
    pub fn set_connection_status(&self, status: bool) {
        let changed = self.sender.send_if_modified(|state| {
            let changed = state.is_connected != status;
            state.is_connected = status;
            changed
        });
        if changed {
            debug!("Connection status set to {}", status);
        }
    }

    /// Appends a freshly created [`FoodItem`] to the table with `table_id`.
    ///
    /// Unknown tables are ignored and `None` is returned.
    pub fn add_food_to_table(
        &self,
        table_id: TableId,
        food_name: impl Into<String>,
    ) -> Option<FoodItem> {
        let food_name = food_name.into();
        let mut added = None;

        self.sender.send_if_modified(|state| {
            let id = next_food_id(state);
            match state.table_mut(table_id) {
                Some(table) => {
                    let item = FoodItem {
                        id,
                        name: food_name.clone(),
                    };
                    table.food_items.push(item.clone());
                    added = Some(item);
                    true
                }
                None => false,
            }
        });

        match &added {
            Some(_) => info!(
                "State updated: Food \"{}\" added to Table {}",
                food_name, table_id
            ),
            None => debug!(
                "Ignoring food \"{}\" for unknown table {}",
                food_name, table_id
            ),
        }
        added
    }

    pub fn snapshot(&self) -> RestaurantState {
        self.sender.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.sender.borrow().is_connected
    }

    pub fn table(&self, table_id: TableId) -> Option<Table> {
        self.sender.borrow().table(table_id).cloned()
    }

    /// Returns a receiver that is notified after every change.
    pub fn subscribe(&self) -> watch::Receiver<RestaurantState> {
        self.sender.subscribe()
    }
}

// Wall-clock millis, bumped past the newest existing id so ids never repeat
// inside one store.
fn next_food_id(state: &RestaurantState) -> FoodId {
    let now = Utc::now().timestamp_millis();
    match state.last_food_id() {
        Some(FoodId(last)) if last >= now => FoodId(last + 1),
        _ => FoodId(now),
    }
}
