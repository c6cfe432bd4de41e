use std::path::PathBuf;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use table_orders::kitchen::Kitchen;
use table_orders::mqtt::{BrokerClient, ClientEvent, Connector, EventSink, RumqttConnector};
use table_orders::setup::setup;
use table_orders::AppConfig;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_create(&path).await?;
    setup(config.level()?)?;
    info!("Starting Backend. Connecting...");

    let (events_tx, mut events) = mpsc::channel(config.mqtt.channel_capacity);
    let sink = EventSink::new(0, events_tx);
    let client = RumqttConnector::new("kitchen").connect(&config.mqtt, sink)?;
    let kitchen = Kitchen::new(client.clone(), config.kitchen, config.mqtt.order_topic);

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event.map(|e| e.event) {
                Some(ClientEvent::Error(reason)) => {
                    break Err(eyre!("connection to broker failed: {}", reason));
                }
                Some(event) => kitchen.handle_event(event),
                None => break Err(eyre!("event loop stopped unexpectedly")),
            },
        }
    };

    kitchen.close().await;
    if outcome.is_ok() {
        BrokerClient::disconnect(&client)?;
        let confirmed = tokio::time::timeout(DISCONNECT_GRACE, async {
            while let Some(event) = events.recv().await {
                if event.event.is_terminal() {
                    break;
                }
            }
        })
        .await;
        if confirmed.is_err() {
            warn!("Broker did not confirm disconnect");
        }
        info!("Backend shut down cleanly.");
    }
    outcome
}
