//! Line-based terminal frontend.
//!
//! Stands in for the table UI: typed commands become requests to the MQTT
//! worker and every store change is rendered as a fresh table overview.

use std::fmt::Write as _;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::RestaurantContext;
use crate::mqtt::MqttStatus;
use crate::state::{RestaurantState, TableId, TABLE_COUNT};

pub const HELP: &str = "\
Commands:
  order <table> <food>   send an order for table 1-4 to the kitchen
  tables                 show the food delivered to each table
  status                 show the broker connection status
  connect                connect to the broker
  disconnect             disconnect from the broker
  help                   show this text
  quit                   exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Order { table_id: TableId, food_name: String },
    Tables,
    Status,
    Connect,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("there is no table {0}, tables are 1-{max}", max = TABLE_COUNT)]
    InvalidTable(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let keyword = words.next().ok_or(CommandError::Empty)?;

        match keyword.to_ascii_lowercase().as_str() {
            "order" => {
                let table = words.next().ok_or(CommandError::MissingArgument("table"))?;
                let table_id = match table.parse::<u32>() {
                    Ok(id) if (1..=TABLE_COUNT).contains(&id) => TableId(id),
                    _ => return Err(CommandError::InvalidTable(table.to_string())),
                };
                let food_name = words.collect::<Vec<_>>().join(" ");
                if food_name.is_empty() {
                    return Err(CommandError::MissingArgument("food name"));
                }
                Ok(Command::Order {
                    table_id,
                    food_name,
                })
            }
            "tables" => Ok(Command::Tables),
            "status" => Ok(Command::Status),
            "connect" => Ok(Command::Connect),
            "disconnect" => Ok(Command::Disconnect),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub fn render_state(state: &RestaurantState) -> String {
    let mut out = String::new();
    let status = if state.is_connected {
        "connected"
    } else {
        "disconnected"
    };
    let _ = writeln!(out, "Kitchen: {}", status);
    for table in &state.tables {
        let _ = writeln!(out, "  {}", table);
    }
    out
}

pub fn render_status(status: &MqttStatus) -> String {
    let mut out = format!(
        "{:?} | received {} (dropped {}) | orders sent {} (failed {})",
        status.connection_state,
        status.messages_received,
        status.messages_dropped,
        status.orders_sent,
        status.orders_failed
    );
    if let Some(at) = status.last_activity {
        let _ = write!(out, " | last activity {}", at.format("%H:%M:%S"));
    }
    if let Some(error) = &status.last_error {
        let _ = write!(out, " | last error: {}", error);
    }
    out
}

/// Prints the table overview after every change of the store.
pub fn spawn_renderer(mut state: watch::Receiver<RestaurantState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            println!("{}", render_state(&snapshot));
        }
        debug!("Renderer stopped, store dropped");
    })
}

/// Executes one command. Returns `false` once the user asked to quit.
pub async fn execute(command: Command, ctx: &RestaurantContext) -> bool {
    match command {
        Command::Order {
            table_id,
            food_name,
        } => {
            if !ctx.store.is_connected() {
                println!("Not connected, order for table {} not sent", table_id);
            }
            ctx.mqtt.publish_order(table_id, food_name).await;
        }
        Command::Tables => print!("{}", render_state(&ctx.store.snapshot())),
        Command::Status => println!("{}", render_status(&ctx.mqtt.status().borrow())),
        Command::Connect => ctx.mqtt.connect_and_subscribe().await,
        Command::Disconnect => ctx.mqtt.disconnect().await,
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

/// Reads commands from `input` until `quit` or end of input.
pub async fn run<R>(ctx: &RestaurantContext, input: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match line.parse::<Command>() {
            Ok(command) => {
                if !execute(command, ctx).await {
                    break;
                }
            }
            Err(CommandError::Empty) => {}
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}
