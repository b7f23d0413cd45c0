mod config;
mod handler;

use crate::config::{AppConfig, LogFormat, LoggingConfig};
use crate::handler::EventHandler;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vocal_audio::backend::system::SystemBackend;
use vocal_audio::session::VoiceSession;
use vocal_audio::{Device, DeviceType};
use vocal_protocol::ClientEvent;

/// Time given to in-flight blocking reads (stdin) once the event loop has exited.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "Headless real-time voice client")]
#[command(
    long_about = "Streams microphone audio as JSON events on stdout and plays back audio events received on stdin"
)]
pub struct CliArgs {
    /// Additional configuration file, applied on top of ./config.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print available audio devices and exit.
    #[arg(long)]
    list_devices: bool,
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = AppConfig::parse(args.config.as_deref())?;
    init_tracing(&config.logging);

    tracing::trace!(?config, "Parsed config");

    if args.list_devices {
        return list_devices();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let result = runtime.block_on(run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the event stream, logs go to stderr
    match config.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn list_devices() -> anyhow::Result<()> {
    for device_type in [DeviceType::Input, DeviceType::Output] {
        let default_name = Device::find_default(device_type)
            .map(|device| device.device_name())
            .ok();

        println!("{device_type} devices:");
        for device in Device::find_all(device_type)? {
            let name = device.device_name();
            let marker = if Some(&name) == default_name.as_ref() {
                " (default)"
            } else {
                ""
            };
            println!(
                "  {name}{marker}: {} Hz, {} channels",
                device.sample_rate(),
                device.channels()
            );
        }
    }
    Ok(())
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let mut drain = tokio::time::interval(Duration::from_millis(
        config.audio.capture.drain_interval_ms.max(1),
    ));
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (faults_tx, mut faults_rx) = mpsc::unbounded_channel();

    let backend = SystemBackend::new(&config.audio);
    let session = VoiceSession::new(backend, config.audio).with_fault_sender(faults_tx);
    let mut handler = EventHandler::new(session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("Waiting for server events on stdin");
    loop {
        let outbound: Vec<ClientEvent> = tokio::select! {
            _ = shutdown_token.cancelled() => break,
            line = lines.next_line() => {
                match line.context("Failed to read server event")? {
                    Some(line) => handler.handle_line(&line).into_iter().collect(),
                    None => {
                        tracing::info!("Server event stream closed");
                        break;
                    }
                }
            }
            _ = drain.tick() => handler.drain_chunks(),
            Some(err) = faults_rx.recv() => handler.fault(err).into_iter().collect(),
        };

        for event in &outbound {
            send_event(&mut stdout, event).await?;
        }
    }

    handler.shutdown();
    stdout.flush().await.context("Failed to flush stdout")?;
    tracing::info!("Shut down");
    Ok(())
}

async fn send_event(stdout: &mut tokio::io::Stdout, event: &ClientEvent) -> anyhow::Result<()> {
    let mut json = event.serialize().context("Failed to serialize client event")?;
    json.push('\n');
    stdout
        .write_all(json.as_bytes())
        .await
        .context("Failed to write client event")?;
    stdout.flush().await.context("Failed to flush stdout")
}

async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(?err, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(?err, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown_token.cancel();
}
