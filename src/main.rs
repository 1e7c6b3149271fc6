//! Rustscape World Server
//!
//! Boots the world core: logging, configuration, plugins and the tick loop,
//! then waits for Ctrl+C or SIGTERM to shut down cleanly.

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use rustscape_world::config::{LogFormat, ServerConfig};
use rustscape_world::game::plugin::PluginManager;
use rustscape_world::game::world::{World, WorldSettings};
use rustscape_world::{REVISION, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load configuration. The log format comes from it, so warnings raised
    // while loading go to a plain stderr logger.
    let config = {
        let _bootstrap = tracing::subscriber::set_default(bootstrap_subscriber(std::io::stderr));
        ServerConfig::load().await?
    };

    // Initialize logging
    init_logging(&config);

    info!("╔══════════════════════════════════════════════╗");
    info!("║        Rustscape World Server v{}            ║", VERSION);
    info!("║          Revision: {}                        ║", REVISION);
    info!("╚══════════════════════════════════════════════╝");
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut plugins = PluginManager::with_defaults(config.plugin_config_dir.clone());
    plugins.init().await;
    info!(plugins = ?plugins.names(), "Plugins initialized");

    // Start the game world tick
    let mut world = World::with_plugins(WorldSettings::from_config(&config), plugins);
    let mut world_shutdown_rx = shutdown_tx.subscribe();
    let world_handle = tokio::spawn(async move {
        world.run(&mut world_shutdown_rx).await;
    });

    info!("World {} is running", config.world_id);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await?;

    info!("Shutting down server...");
    world_handle.await?;

    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Logger used until the configured one is installed
fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .finish()
}

/// Initialize the logging/tracing system
fn init_logging(config: &ServerConfig) {
    let default_filter = if config.debug {
        "debug"
    } else {
        "info,rustscape_world=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true);

    match config.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_config_warnings_reach_bootstrap_logger() {
        let captured = Captured::default();
        let sink = captured.clone();
        let path = std::env::temp_dir().join("rustscape-world-bootstrap-missing.toml");

        let config = {
            let _bootstrap =
                tracing::subscriber::set_default(bootstrap_subscriber(move || sink.clone()));
            ServerConfig::load_file(&path).await.unwrap()
        };

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("Config file not found"));
        assert!(output.contains("WARN"));
        assert_eq!(config.config_path, path);
    }
}
