use std::path::PathBuf;

use color_eyre::Result;
use table_orders::console;
use table_orders::setup::setup;
use table_orders::{AppConfig, RestaurantContext};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_create(&path).await?;
    setup(config.level()?)?;
    info!("Starting table frontend with config {}", path.display());

    let ctx = RestaurantContext::start(config.mqtt);
    let renderer = console::spawn_renderer(ctx.store.subscribe());

    ctx.mqtt.connect_and_subscribe().await;
    println!("{}", console::HELP);

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = console::run(&ctx, stdin) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    ctx.shutdown().await;
    renderer.abort();
    Ok(())
}
