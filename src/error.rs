//! Errors returned by the device plugin.

use std::path::PathBuf;
use thiserror::Error;

/// A device plugin error
#[derive(Debug, Error)]
pub enum Error {
    /// A device given on the command line could not be parsed
    #[error("invalid device spec {:?}: {}", spec, reason)]
    InvalidDeviceSpec {
        /// The raw spec
        spec: String,
        /// Why it was rejected
        reason: String,
    },
    /// The same device ID was advertised twice
    #[error("device {} is listed more than once", id)]
    DuplicateDevice {
        /// The repeated device ID
        id: String,
    },
    /// There are no devices to advertise
    #[error("the device inventory is empty")]
    EmptyInventory,
    /// The configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The plugin socket could not be bound
    #[error("unable to listen on {}: {}", path.display(), source)]
    Bind {
        /// The socket path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },
    /// Filesystem error while preparing the socket
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The gRPC server or a gRPC connection failed
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
    /// Kubelet refused or never answered the registration request
    #[error("registration with kubelet at {} failed: {}", kubelet_socket.display(), status)]
    Registration {
        /// Kubelet's registration socket
        kubelet_socket: PathBuf,
        /// The status kubelet answered with
        status: tonic::Status,
    },
    /// The task running the gRPC server panicked or was cancelled
    #[error("device plugin server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
