use device_plugin::config::Config;
use device_plugin::DevicePluginServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The provided version will be used for the CLI
    let config = Config::new_from_flags(env!("CARGO_PKG_VERSION"))?;

    // Initialize the logger
    tracing_subscriber::fmt::init();

    let server = DevicePluginServer::new(config)?;
    let stopper = server.stopper();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, stopping");
                stopper.stop();
            }
            Err(e) => error!(error = %e, "Unable to listen for interrupt"),
        }
    });

    server.listen_and_serve().await?;
    Ok(())
}
