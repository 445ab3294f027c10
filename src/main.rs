use std::io::BufRead;

use anyhow::Context;
use log::LevelFilter;
use sensor_poller::client::SensorClient;
use sensor_poller::command::Command;
use sensor_poller::config::Config;
use sensor_poller::panel;
use sensor_poller::poller::Poller;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env();
    let level = config
        .as_ref()
        .map(|c| c.log_level)
        .unwrap_or(LevelFilter::Info);

    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run(config: Config) -> Result<(), anyhow::Error> {
    let client = SensorClient::new(&config).context("Failed to initialize sensor client")?;
    let poller = Poller::new(client, config.initial_sensor, config.poll_interval);
    log::info!(
        "Polling {} every {:?}, starting at sensor {}",
        config.base_url,
        config.poll_interval,
        poller.state().selected
    );
    println!("{}", panel::render(poller.state()));

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(8);
    let (upd_tx, mut upd_rx) = mpsc::channel(16);

    let mut poller = tokio::spawn(poller.run(cmd_rx, upd_tx));

    let renderer = tokio::spawn(async move {
        while let Some(state) = upd_rx.recv().await {
            println!("{}", panel::render(&state));
        }
    });

    // Blocking stdin lives on its own thread so shutdown never waits on it.
    let stdin_tx = cmd_tx.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.parse::<Command>() {
                Ok(command) => {
                    if stdin_tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{e}"),
            }
        }
    });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to wait for Ctrl+C signal")?;
            log::info!("Shutting down");
            // The poller may already have stopped on its own.
            let _ = cmd_tx.send(Command::Quit).await;
            poller.await.context("Poller task failed")?;
        }
        res = &mut poller => {
            res.context("Poller task failed")?;
        }
    }

    renderer.await.context("Renderer task failed")?;

    Ok(())
}
