//! Binds the plugin socket and serves the `DevicePlugin` service until stopped.
use crate::config::Config;
use crate::device::DeviceInventory;
use crate::device_plugin_api::v1beta1::{
    device_plugin_server::DevicePluginServer as DevicePluginGrpcServer, DevicePluginOptions,
};
use crate::grpc_sock;
use crate::plugin::DevicePluginService;
use crate::registration;
use crate::stopper::Stopper;
use crate::Error;
use std::path::Path;
use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::{debug, error, info};

/// Owns everything needed to serve the plugin: its config, its devices and its stop signal.
pub struct DevicePluginServer {
    config: Config,
    inventory: DeviceInventory,
    stopper: Stopper,
}

impl DevicePluginServer {
    /// Validates `config` and builds the device inventory. Nothing is bound yet.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let inventory = DeviceInventory::new(config.devices.clone())?;
        Ok(DevicePluginServer {
            config,
            inventory,
            stopper: Stopper::new(),
        })
    }

    /// A handle that stops this server when triggered
    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    /// Stops the server and ends every open `ListAndWatch` stream. Safe to call more than once.
    pub fn shutdown(&self) {
        info!("Shutting down device plugin");
        self.stopper.stop();
    }

    fn options(&self) -> DevicePluginOptions {
        DevicePluginOptions {
            pre_start_required: self.config.pre_start_required,
            get_preferred_allocation_available: self.config.get_preferred_allocation_available,
        }
    }

    /// Removes any stale socket, binds a fresh one, registers with kubelet if configured and
    /// serves until [`DevicePluginServer::shutdown`] is called. The socket file is removed on
    /// return.
    pub async fn listen_and_serve(&self) -> Result<(), Error> {
        let socket_path = self.config.socket_path.as_path();
        let socket = bind(socket_path).await?;
        info!(
            socket = %socket_path.display(),
            devices = self.inventory.len(),
            "Device plugin listening"
        );

        let service = DevicePluginService::new(
            self.inventory.clone(),
            self.options(),
            self.config.update_interval,
            self.config.allocate_env.clone(),
            self.stopper.clone(),
        );
        let stopper = self.stopper.clone();
        let serve = Server::builder()
            .add_service(DevicePluginGrpcServer::new(service))
            .serve_with_incoming_shutdown(socket, async move { stopper.wait().await });

        match &self.config.registration {
            Some(registration) => {
                // Kubelet dials back as soon as registration succeeds, so the server has to be
                // accepting before the request goes out
                let serve = tokio::spawn(serve);
                let registered = registration::register(
                    &registration.kubelet_socket,
                    socket_path,
                    &self.config.resource_name,
                    self.options(),
                )
                .await;
                if let Err(e) = registered {
                    error!(error = %e, "Unable to register with kubelet");
                    self.stopper.stop();
                    // The registration error is the cause, a server failure is only logged
                    if let Err(server_error) = join_server(serve).await {
                        error!(error = %server_error, "Device plugin server failed while stopping");
                    }
                    return Err(e);
                }
                join_server(serve).await?;
            }
            None => serve.await?,
        }
        info!("Device plugin stopped");
        Ok(())
    }
}

/// Waits for a spawned server, flattening a panicked or cancelled task into [`Error::Task`].
async fn join_server(
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
) -> Result<(), Error> {
    handle.await??;
    Ok(())
}

/// Clears whatever is left at `path` from a previous run and binds a new socket there.
async fn bind(path: &Path) -> Result<grpc_sock::server::Socket, Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(socket = %path.display(), "Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => return Err(Error::Io(e)),
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    grpc_sock::server::Socket::new(path).map_err(|source| Error::Bind {
        path: path.to_owned(),
        source,
    })
}
