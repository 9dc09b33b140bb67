//! The `DevicePlugin` gRPC service kubelet talks to.
use crate::device::{DeviceHealth, DeviceInventory};
use crate::device_plugin_api::v1beta1::{
    device_plugin_server::DevicePlugin, AllocateRequest, AllocateResponse,
    ContainerAllocateResponse, ContainerPreferredAllocationRequest,
    ContainerPreferredAllocationResponse, DevicePluginOptions, Empty, ListAndWatchResponse,
    PreStartContainerRequest, PreStartContainerResponse, PreferredAllocationRequest,
    PreferredAllocationResponse,
};
use crate::stopper::Stopper;
use futures::Stream;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, trace};

/// Serves the device plugin API for a fixed [`DeviceInventory`].
#[derive(Clone, Debug)]
pub struct DevicePluginService {
    inventory: Arc<DeviceInventory>,
    options: DevicePluginOptions,
    update_interval: Duration,
    allocate_env: String,
    stopper: Stopper,
}

impl DevicePluginService {
    /// Returns a service advertising `inventory`. Every `ListAndWatch` stream resends the list
    /// each `update_interval` until `stopper` fires.
    pub fn new(
        inventory: DeviceInventory,
        options: DevicePluginOptions,
        update_interval: Duration,
        allocate_env: impl Into<String>,
        stopper: Stopper,
    ) -> Self {
        DevicePluginService {
            inventory: Arc::new(inventory),
            options,
            update_interval,
            allocate_env: allocate_env.into(),
            stopper,
        }
    }

    /// Builds the response for a single container, failing on unknown or unhealthy devices.
    fn allocate_container(
        &self,
        device_ids: &[String],
    ) -> Result<ContainerAllocateResponse, Status> {
        for id in device_ids {
            match self.inventory.get(id) {
                None => {
                    return Err(Status::invalid_argument(format!(
                        "device {} is not advertised by this plugin",
                        id
                    )))
                }
                Some(spec) if spec.health == DeviceHealth::Unhealthy => {
                    return Err(Status::failed_precondition(format!(
                        "device {} is unhealthy",
                        id
                    )))
                }
                Some(_) => (),
            }
        }
        let mut envs = HashMap::new();
        envs.insert(self.allocate_env.clone(), device_ids.join(","));
        Ok(ContainerAllocateResponse {
            envs,
            ..Default::default()
        })
    }

    /// Spawns the task feeding one `ListAndWatch` stream. It sends the device list on every
    /// tick and ends when the stopper fires or the receiving side is dropped.
    fn watch_devices(
        &self,
    ) -> (
        ReceiverStream<Result<ListAndWatchResponse, Status>>,
        JoinHandle<()>,
    ) {
        let (kubelet_update_sender, kubelet_update_receiver) = mpsc::channel(1);
        let inventory = self.inventory.clone();
        let stopper = self.stopper.clone();
        let mut ticker = tokio::time::interval(self.update_interval);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stopper.wait() => {
                        debug!("Stopping ListAndWatch stream");
                        break;
                    }
                    // The first tick completes immediately so kubelet gets the list on connect
                    _ = ticker.tick() => {
                        info!(devices = inventory.len(), "updating device list");
                        if kubelet_update_sender
                            .send(Ok(inventory.list_and_watch_response()))
                            .await
                            .is_err()
                        {
                            debug!("ListAndWatch client went away");
                            break;
                        }
                    }
                }
            }
        });
        (ReceiverStream::new(kubelet_update_receiver), task)
    }
}

/// Chooses up to `allocation_size` devices: everything in `must_include` first, then the rest of
/// `available` in order. Unknown, unhealthy and repeated IDs are skipped.
fn preferred_allocation(
    inventory: &DeviceInventory,
    request: &ContainerPreferredAllocationRequest,
) -> Result<Vec<String>, Status> {
    if request.allocation_size < 0 {
        return Err(Status::invalid_argument(format!(
            "allocation size {} is negative",
            request.allocation_size
        )));
    }
    let size = request.allocation_size as usize;
    let candidates = request
        .must_include_device_i_ds
        .iter()
        .chain(request.available_device_i_ds.iter());
    let mut seen: HashSet<&str> = HashSet::new();
    let chosen = candidates
        .filter(|&id| inventory.is_healthy(id) && seen.insert(id.as_str()))
        .take(size)
        .cloned()
        .collect();
    Ok(chosen)
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DevicePluginOptions>, Status> {
        Ok(Response::new(self.options.clone()))
    }

    type ListAndWatchStream =
        Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send + Sync + 'static>>;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListAndWatchStream>, Status> {
        debug!("ListAndWatch stream opened");
        let (updates, _) = self.watch_devices();
        Ok(Response::new(Box::pin(updates)))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> Result<Response<PreferredAllocationResponse>, Status> {
        let container_responses = request
            .into_inner()
            .container_requests
            .iter()
            .map(|container_request| {
                preferred_allocation(&self.inventory, container_request).map(|device_i_ds| {
                    ContainerPreferredAllocationResponse { device_i_ds }
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;
        trace!(?container_responses, "Computed preferred allocation");
        Ok(Response::new(PreferredAllocationResponse {
            container_responses,
        }))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let allocate_request = request.into_inner();
        let container_responses = allocate_request
            .container_requests
            .iter()
            .map(|container_request| self.allocate_container(&container_request.devices_i_ds))
            .collect::<Result<Vec<_>, Status>>()?;
        info!(
            containers = container_responses.len(),
            "Allocated devices"
        );
        Ok(Response::new(AllocateResponse {
            container_responses,
        }))
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> Result<Response<PreStartContainerResponse>, Status> {
        debug!(devices = ?request.get_ref().devices_i_ds, "PreStartContainer called");
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
