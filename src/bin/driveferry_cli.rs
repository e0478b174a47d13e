//! DriveFerry CLI — copy a file between two cloud drive accounts
//!
//! Usage:
//!   driveferry-cli [--engine-url URL] [--client-id ID] [--callback-port PORT]
//!
//! Then, at the prompt:
//!   connect A|B          Authorize a drive in the browser
//!   disconnect A|B       Drop a drive session
//!   ls A|B               List the drive's files
//!   select A|B <file>    Choose a file (drive A's choice is the source)
//!   transfer             Copy the selected drive-A file to drive B
//!   status               Show both sessions and transfer readiness
//!   quit                 Exit

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use driveferry::{
    auth, config, DriveSlot, RcloneRcEngine, StatusArea, StatusEvent, TransferCoordinator,
};

#[derive(Parser)]
#[command(
    name = "driveferry-cli",
    about = "DriveFerry — copy a file between two cloud drive accounts",
    version,
    long_about = "Authorizes two independent drive sessions via the browser and hands\nthe actual copying to an rclone remote-control daemon (rclone rcd)."
)]
struct Cli {
    /// rclone remote-control endpoint (overrides the saved config)
    #[arg(long)]
    engine_url: Option<String>,

    /// OAuth client identifier (overrides the saved config)
    #[arg(long)]
    client_id: Option<String>,

    /// Loopback port for the authorization redirect (overrides the saved config)
    #[arg(long)]
    callback_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driveferry=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config();
    if let Some(engine_url) = cli.engine_url {
        config.engine_url = engine_url;
    }
    if let Some(client_id) = cli.client_id {
        config.client_id = client_id;
    }
    if let Some(port) = cli.callback_port {
        config.callback_port = port;
    }

    let engine = Arc::new(RcloneRcEngine::new(config.engine_url.clone()));
    let coordinator = Arc::new(TransferCoordinator::new(config, engine));
    spawn_event_printer(&coordinator);

    println!("DriveFerry — engine at {}", coordinator.config().engine_url);
    println!("Type 'help' for commands.");

    run_prompt(coordinator).await
}

async fn run_prompt(coordinator: Arc<TransferCoordinator>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        // Let the event printer drain before the prompt reappears.
        tokio::time::sleep(Duration::from_millis(25)).await;
        print!("ferry> ");
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await.context("reading stdin")? {
            Some(line) => line,
            None => return Ok(()),
        };

        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(command) => command,
            None => continue,
        };

        match command {
            "connect" => match parse_slot(words.next()) {
                Ok(slot) => {
                    if let Err(e) = connect(&coordinator, slot).await {
                        println!("Could not authorize drive {}: {:#}", slot, e);
                    }
                }
                Err(e) => println!("{}", e),
            },
            "disconnect" => match parse_slot(words.next()) {
                Ok(slot) => coordinator.disconnect(slot).await,
                Err(e) => println!("{}", e),
            },
            "ls" => match parse_slot(words.next()) {
                Ok(slot) => {
                    // The listing lands on the status channel.
                    let _ = coordinator.refresh_listing(slot).await;
                }
                Err(e) => println!("{}", e),
            },
            "select" => match parse_slot(words.next()) {
                Ok(slot) => {
                    let file = words.collect::<Vec<_>>().join(" ");
                    if file.is_empty() {
                        println!("usage: select A|B <file>");
                    } else {
                        coordinator.select(slot, &file).await;
                    }
                }
                Err(e) => println!("{}", e),
            },
            "transfer" => {
                // Outcomes land on the status channel either way.
                let _ = coordinator.transfer().await;
            }
            "status" => {
                for slot in DriveSlot::ALL {
                    println!("drive {}: {}", slot, coordinator.slot_state(slot).await);
                }
                let ready = coordinator.transfer_ready().await;
                println!("transfer ready: {}", if ready { "yes" } else { "no" });
            }
            "help" => print_help(),
            "quit" | "exit" => return Ok(()),
            other => println!("unknown command: {} (try 'help')", other),
        }
    }
}

/// Run one authorization round trip: loopback listener, browser, fragment.
async fn connect(coordinator: &Arc<TransferCoordinator>, slot: DriveSlot) -> Result<()> {
    let (listener, port) =
        auth::bind_callback_listener_on_port(coordinator.config().callback_port).await?;
    let redirect_uri = format!("http://127.0.0.1:{}/", port);
    let url = coordinator.begin_auth(slot, &redirect_uri).await?;

    if open::that(&url).is_ok() {
        println!("Complete the authorization for drive {} in your browser...", slot);
    } else {
        println!("Open this URL in your browser to authorize drive {}:", slot);
        println!("  {}", url);
    }

    let fragment = auth::wait_for_fragment(&listener).await?;
    if coordinator.complete_auth(&fragment).await.is_none() {
        println!("Authorization did not complete for drive {}.", slot);
    }
    Ok(())
}

fn parse_slot(word: Option<&str>) -> Result<DriveSlot, String> {
    match word {
        Some(word) => word
            .parse::<DriveSlot>()
            .map_err(|_| format!("expected drive slot A or B, got {:?}", word)),
        None => Err("expected drive slot A or B".to_string()),
    }
}

fn spawn_event_printer(coordinator: &TransferCoordinator) {
    let mut rx = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Session, selection, and transfer transitions already arrive as `Message`
/// events; printing those plus the file rows covers the whole surface.
fn print_event(event: &StatusEvent) {
    match event {
        StatusEvent::Message { area, text } => match area {
            StatusArea::Global => println!("status: {}", text),
            StatusArea::Slot(slot) => println!("[{}] {}", slot, text),
        },
        StatusEvent::FilesUpdated { slot, files } => {
            if files.is_empty() {
                println!("[{}] No files found.", slot);
            } else {
                for file in files {
                    println!("[{}]   {}", slot, file);
                }
            }
        }
        _ => {}
    }
}

fn print_help() {
    println!("  connect A|B          Authorize a drive in the browser");
    println!("  disconnect A|B       Drop a drive session");
    println!("  ls A|B               List the drive's files");
    println!("  select A|B <file>    Choose a file (drive A's choice is the source)");
    println!("  transfer             Copy the selected drive-A file to drive B");
    println!("  status               Show both sessions and transfer readiness");
    println!("  quit                 Exit");
}
