//! Configuration for the device plugin
//!
//! Use [`Config::default_config`] for the defaults or [`Config::new_from_flags`] to read them
//! from the command line and environment.

use crate::device::{default_devices, DeviceInventory, DeviceSpec};
use crate::Error;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

const DEFAULT_SOCKET_PATH: &str = "device-server";
const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 15;
const DEFAULT_RESOURCE_NAME: &str = "nxcore.io/bme280";
const DEFAULT_ALLOCATE_ENV: &str = "ALLOCATED_DEVICE_IDS";

/// The configuration needed for the device plugin to run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Where the plugin's gRPC socket is created
    pub socket_path: PathBuf,
    /// How often `ListAndWatch` resends the device list
    pub update_interval: Duration,
    /// The devices to advertise
    pub devices: Vec<DeviceSpec>,
    /// The extended resource name the devices are advertised under
    pub resource_name: String,
    /// Registration with kubelet, if enabled
    pub registration: Option<RegistrationConfig>,
    /// Environment variable that receives the allocated device IDs in each container
    pub allocate_env: String,
    /// Whether kubelet must call `PreStartContainer` before each container start
    pub pre_start_required: bool,
    /// Whether kubelet may call `GetPreferredAllocation`
    pub get_preferred_allocation_available: bool,
}

/// Where to find kubelet's `Registration` service.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// Path of kubelet's registration socket
    pub kubelet_socket: PathBuf,
}

impl Config {
    /// Returns a Config object set with all of the defaults.
    pub fn default_config() -> Self {
        Config {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            update_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            devices: default_devices(),
            resource_name: DEFAULT_RESOURCE_NAME.to_string(),
            registration: None,
            allocate_env: DEFAULT_ALLOCATE_ENV.to_string(),
            pre_start_required: false,
            get_preferred_allocation_available: false,
        }
    }

    /// Parses all command line flags and sets the proper defaults. The version
    /// of your application should be passed to set the proper version for the CLI
    pub fn new_from_flags(version: &str) -> Result<Self, Error> {
        let app = Opts::clap().version(version);
        let opts = Opts::from_clap(&app.get_matches());
        Config::from_opts(opts)
    }

    /// Builds a config from already parsed options and validates it
    pub fn from_opts(opts: Opts) -> Result<Self, Error> {
        let devices = if opts.devices.is_empty() {
            default_devices()
        } else {
            opts.devices
        };

        let registration = if opts.register {
            Some(RegistrationConfig {
                kubelet_socket: opts.kubelet_socket,
            })
        } else {
            None
        };

        let config = Config {
            socket_path: opts.socket_path,
            update_interval: Duration::from_secs(opts.update_interval),
            devices,
            resource_name: opts.resource_name,
            registration,
            allocate_env: opts.allocate_env,
            pre_start_required: opts.pre_start_required,
            get_preferred_allocation_available: opts.preferred_allocation,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the config can be served
    pub fn validate(&self) -> Result<(), Error> {
        if self.update_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "update interval must be greater than zero".to_string(),
            ));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("socket path is empty".to_string()));
        }
        if self.resource_name.is_empty() {
            return Err(Error::InvalidConfig("resource name is empty".to_string()));
        }
        if self.allocate_env.is_empty() || self.allocate_env.contains('=') {
            return Err(Error::InvalidConfig(format!(
                "{:?} is not a valid environment variable name",
                self.allocate_env
            )));
        }
        // Surfaces duplicate IDs before anything is bound
        DeviceInventory::new(self.devices.clone())?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// CLI options that can be configured for the device plugin
#[derive(StructOpt, Clone, Debug)]
#[structopt(
    name = "device-plugin",
    about = "A Kubernetes device plugin serving a static device list over a Unix socket"
)]
pub struct Opts {
    #[structopt(
        short = "s",
        long = "socket-path",
        default_value = "device-server",
        env = "DEVICE_PLUGIN_SOCKET",
        help = "Path of the Unix socket the plugin serves on"
    )]
    socket_path: PathBuf,

    #[structopt(
        short = "i",
        long = "update-interval",
        default_value = "15",
        env = "DEVICE_PLUGIN_UPDATE_INTERVAL",
        help = "Seconds between device list updates sent on ListAndWatch"
    )]
    update_interval: u64,

    #[structopt(
        short = "d",
        long = "device",
        env = "DEVICE_PLUGIN_DEVICES",
        use_delimiter = true,
        help = "A device to advertise, as ID or ID=Healthy|Unhealthy. May be given more than once. Defaults to bme280-nxcore"
    )]
    devices: Vec<DeviceSpec>,

    #[structopt(
        short = "r",
        long = "resource-name",
        default_value = "nxcore.io/bme280",
        env = "DEVICE_PLUGIN_RESOURCE_NAME",
        help = "Extended resource name to register the devices under"
    )]
    resource_name: String,

    #[structopt(
        long = "register",
        help = "Register with kubelet once the plugin is serving"
    )]
    register: bool,

    #[structopt(
        long = "kubelet-socket",
        default_value = "/var/lib/kubelet/device-plugins/kubelet.sock",
        env = "DEVICE_PLUGIN_KUBELET_SOCKET",
        help = "Path of kubelet's device plugin registration socket"
    )]
    kubelet_socket: PathBuf,

    #[structopt(
        long = "allocate-env",
        default_value = "ALLOCATED_DEVICE_IDS",
        env = "DEVICE_PLUGIN_ALLOCATE_ENV",
        help = "Environment variable set in containers to the comma separated allocated device IDs"
    )]
    allocate_env: String,

    #[structopt(
        long = "pre-start-required",
        help = "Ask kubelet to call PreStartContainer before each container start"
    )]
    pre_start_required: bool,

    #[structopt(
        long = "preferred-allocation",
        help = "Advertise GetPreferredAllocation to kubelet"
    )]
    preferred_allocation: bool,
}
