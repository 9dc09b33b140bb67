//! A Kubernetes [device plugin](https://kubernetes.io/docs/concepts/extend-kubernetes/compute-storage-net/device-plugins/)
//! that advertises a fixed set of devices to kubelet.
//!
//! The plugin serves the `v1beta1` `DevicePlugin` gRPC service on a Unix socket. Kubelet calls
//! `ListAndWatch` to learn which devices exist and whether they are healthy, then `Allocate`
//! whenever a container asks for one of them.
//!
//! # Example
//! ```rust,no_run
//! use device_plugin::{config::Config, DevicePluginServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = DevicePluginServer::new(Config::default())?;
//!     let stopper = server.stopper();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         stopper.stop();
//!     });
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod device;
pub mod error;
pub mod grpc_sock;
pub mod plugin;
pub mod registration;
pub mod server;
pub mod stopper;

pub use error::Error;
pub use server::DevicePluginServer;

/// Generated bindings for the Kubernetes device plugin API.
#[allow(missing_docs)]
pub mod device_plugin_api {
    pub mod v1beta1 {
        /// Version of the device plugin API this plugin speaks.
        pub const API_VERSION: &str = "v1beta1";
        tonic::include_proto!("v1beta1");
    }
}
