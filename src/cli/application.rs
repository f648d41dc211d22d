use log::{info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::spawn;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cli::render::status_line;
use crate::cli::types::{Args, UserCommand, HELP};
use crate::config::io::load_config;
use crate::device::btle::spawn_btle_bridge;
use crate::device::runtime::{event_queue, spawn_link, LinkHandle};
use crate::device::types::Snapshot;
use crate::error::{AppRunError, LinkError};

async fn print_snapshots(mut snapshots: watch::Receiver<Snapshot>, cancel: CancellationToken) {
    let mut last_line = String::new();

    'mainloop: loop {
        let line = status_line(&snapshots.borrow_and_update());
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }

        tokio::select! {
            _ = cancel.cancelled() => break 'mainloop,
            changed = snapshots.changed() => if changed.is_err() {
                break 'mainloop;
            },
        }
    }
}

fn print_result(result: Result<(), LinkError>) {
    if let Err(err) = result {
        println!("! {}", err);
    }
}

fn print_logs(link: &LinkHandle) {
    // newest first in the ring, oldest first on the terminal
    for line in link.snapshot().log_lines.iter().rev() {
        println!("{}", line);
    }
}

async fn run_link(args: Args) -> Result<(), AppRunError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(device_name) = args.device_name {
        config.device_name = device_name;
    }
    info!("Looking for device {:?}", config.device_name);

    let app_cancel = CancellationToken::new();
    let (event_sender, event_receiver) = event_queue();
    let (adapter, bridge_handle) = spawn_btle_bridge(
        app_cancel.child_token(),
        event_sender.clone(),
    ).await?;
    let (link, link_handle) = spawn_link(
        config,
        adapter,
        (event_sender, event_receiver),
        app_cancel.child_token(),
    );
    let printer_handle = spawn(print_snapshots(link.subscribe(), app_cancel.child_token()));

    println!("{}", HELP);
    let mut lines = BufReader::new(stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<UserCommand>() {
            Ok(command) => command,
            Err(err) => {
                println!("{}", err);
                continue;
            }
        };

        match command {
            UserCommand::Arm => print_result(link.arm().await),
            UserCommand::Disarm => print_result(link.disarm().await),
            UserCommand::Status => print_result(link.request_status().await),
            UserCommand::Ping => print_result(link.ping().await),
            UserCommand::Reconnect => print_result(link.reconnect()),
            UserCommand::Logs => print_logs(&link),
            UserCommand::Clear => print_result(link.clear_logs()),
            UserCommand::Help => println!("{}", HELP),
            UserCommand::Quit => break,
        }
    }

    info!("Shutting down");
    link.shutdown();
    app_cancel.cancel();

    for (name, handle) in [("link", link_handle), ("bridge", bridge_handle), ("printer", printer_handle)] {
        if let Err(err) = handle.await {
            warn!("The {} task did not stop cleanly: {}", name, err);
        }
    }

    Ok(())
}

pub fn run_application(args: Args) -> Result<(), AppRunError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_link(args))
}
