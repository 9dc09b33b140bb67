//! One-shot registration with kubelet's device plugin `Registration` service.
use crate::device_plugin_api::v1beta1::{
    registration_client::RegistrationClient, DevicePluginOptions, RegisterRequest, API_VERSION,
};
use crate::grpc_sock;
use crate::Error;
use std::path::Path;
use tracing::info;

/// Kubelet resolves the endpoint relative to its device plugin directory, so only the socket's
/// file name is sent.
pub fn endpoint_name(plugin_socket: &Path) -> String {
    plugin_socket
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| plugin_socket.to_string_lossy().into_owned())
}

/// Registers the plugin serving on `plugin_socket` with the kubelet listening on
/// `kubelet_socket`. Kubelet dials the plugin back and calls `ListAndWatch` once this returns.
pub async fn register(
    kubelet_socket: &Path,
    plugin_socket: &Path,
    resource_name: &str,
    options: DevicePluginOptions,
) -> Result<(), Error> {
    let channel = grpc_sock::client::socket_channel(kubelet_socket).await?;
    let mut registration_client = RegistrationClient::new(channel);
    let register_request = tonic::Request::new(RegisterRequest {
        version: API_VERSION.into(),
        endpoint: endpoint_name(plugin_socket),
        resource_name: resource_name.to_string(),
        options: Some(options),
    });
    registration_client
        .register(register_request)
        .await
        .map_err(|status| Error::Registration {
            kubelet_socket: kubelet_socket.to_owned(),
            status,
        })?;
    info!(
        resource = %resource_name,
        kubelet_socket = %kubelet_socket.display(),
        "Registered with kubelet"
    );
    Ok(())
}
