use device_plugin::config::{Config, RegistrationConfig};
use device_plugin::device_plugin_api::v1beta1::{
    device_plugin_client::DevicePluginClient,
    registration_server::{Registration, RegistrationServer},
    Empty, ListAndWatchResponse, RegisterRequest,
};
use device_plugin::grpc_sock;
use device_plugin::stopper::Stopper;
use device_plugin::DevicePluginServer;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};

pub const RESOURCE_NAME: &str = "nxcore.io/bme280";

/// Returns a config serving on `socket_name` inside `dir` with a short update interval
pub fn test_config(dir: &Path, socket_name: &str) -> Config {
    Config {
        socket_path: dir.join(socket_name),
        update_interval: Duration::from_millis(100),
        ..Config::default_config()
    }
}

/// Returns a config that also registers with a kubelet socket in `dir`
pub fn registering_config(dir: &Path, socket_name: &str) -> Config {
    Config {
        registration: Some(RegistrationConfig {
            kubelet_socket: dir.join("kubelet.sock"),
        }),
        ..test_config(dir, socket_name)
    }
}

/// Runs the plugin in the background, returning its stopper and the serve task
pub fn launch_device_plugin(
    config: Config,
) -> (Stopper, JoinHandle<Result<(), device_plugin::Error>>) {
    let server = DevicePluginServer::new(config).expect("config should be valid");
    let stopper = server.stopper();
    let task = tokio::spawn(async move { server.listen_and_serve().await });
    (stopper, task)
}

/// Connects to the plugin, retrying while the socket comes up
pub async fn connect(socket: impl AsRef<Path>) -> DevicePluginClient<Channel> {
    let time = std::time::Instant::now();
    loop {
        if let Ok(channel) = grpc_sock::client::socket_channel(socket.as_ref()).await {
            return DevicePluginClient::new(channel);
        }
        if time.elapsed().as_secs() > 5 {
            panic!("Could not connect to device plugin");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Mock kubelet registration service. On each registration it dials the plugin back the way
/// kubelet does (endpoint relative to the plugin directory) and forwards the first
/// `ListAndWatch` update it reads.
pub struct MockKubelet {
    plugin_dir: PathBuf,
    updates: mpsc::Sender<(RegisterRequest, ListAndWatchResponse)>,
}

#[tonic::async_trait]
impl Registration for MockKubelet {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let register_request = request.into_inner();
        let endpoint = self.plugin_dir.join(&register_request.endpoint);
        let updates = self.updates.clone();
        tokio::spawn(async move {
            let mut client = connect(&endpoint).await;
            let mut stream = client
                .list_and_watch(Request::new(Empty {}))
                .await
                .expect("ListAndWatch should start")
                .into_inner();
            let first = stream
                .message()
                .await
                .expect("stream should not error")
                .expect("stream should yield an update");
            updates
                .send((register_request, first))
                .await
                .expect("test should be listening for updates");
        });
        Ok(Response::new(Empty {}))
    }
}

/// Serves a [`MockKubelet`] on `kubelet.sock` in `dir`
pub fn launch_mock_kubelet(dir: &Path) -> mpsc::Receiver<(RegisterRequest, ListAndWatchResponse)> {
    let (updates, receiver) = mpsc::channel(1);
    let kubelet = MockKubelet {
        plugin_dir: dir.to_owned(),
        updates,
    };
    let socket = grpc_sock::server::Socket::new(&dir.join("kubelet.sock"))
        .expect("unable to setup mock kubelet socket");
    tokio::spawn(async move {
        Server::builder()
            .add_service(RegistrationServer::new(kubelet))
            .serve_with_incoming(socket)
            .await
            .expect("Unable to serve mock kubelet");
    });
    receiver
}
