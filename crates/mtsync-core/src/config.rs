//! Configuration types for the sync system
//!
//! The daemon builds one [`SyncConfig`] at startup and hands it to the
//! engine and the collaborator crates. Nothing reads configuration from
//! globals after that.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::normalize::InterfaceName;
use crate::traits::Bucket;

/// Address list holding Cloudflare's IPv4 ranges
pub const CLOUDFLARE_V4_LIST: &str = "cloudflarev4";

/// Address list holding Cloudflare's IPv6 ranges
pub const CLOUDFLARE_V6_LIST: &str = "cloudflarev6";

/// Default address list for the tracked interface's address
pub const DEFAULT_INTERFACE_LIST: &str = "proxyv6";

/// Published ranges endpoint
pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4/ips";

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Router connection settings
    pub router: RouterConfig,

    /// Cloudflare range tracking
    #[serde(default)]
    pub cloudflare: CloudflareConfig,

    /// Interface address tracking (disabled when `None`)
    #[serde(default)]
    pub interface: Option<InterfaceConfig>,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.router.validate()?;
        self.engine.validate()?;

        if let Some(interface) = &self.interface {
            interface.validate()?;
        }

        if !self.any_feature_enabled() {
            return Err(crate::Error::config(
                "Neither Cloudflare range tracking nor interface tracking is enabled",
            ));
        }

        Ok(())
    }

    /// Whether at least one bucket family will be managed
    pub fn any_feature_enabled(&self) -> bool {
        self.cloudflare.enabled || self.interface.is_some()
    }
}

/// Router connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Router address
    #[serde(default = "default_router_host")]
    pub host: String,

    /// RouterOS API port
    #[serde(default = "default_router_port")]
    pub port: u16,

    /// Login user
    #[serde(default = "default_username")]
    pub username: String,

    /// Login password
    /// ⚠️ NEVER log this value
    pub password: String,

    /// Per-call timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RouterConfig {
    /// Create router settings with defaults for everything but the password
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            host: default_router_host(),
            port: default_router_port(),
            username: default_username(),
            password: password.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the router settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.is_empty() {
            return Err(crate::Error::config("Router address cannot be empty"));
        }
        if self.username.is_empty() {
            return Err(crate::Error::config("Router username cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(crate::Error::config("Router password is required"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Router timeout must be > 0"));
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the password
impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Cloudflare range tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// Whether the two Cloudflare buckets are managed
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Ranges endpoint
    #[serde(default = "default_cloudflare_api_url")]
    pub api_url: String,

    /// HTTP timeout (in seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip a bucket instead of emptying it when the upstream returns no
    /// ranges for it after a non-empty snapshot was applied
    #[serde(default)]
    pub skip_empty: bool,
}

impl CloudflareConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn v4_bucket(&self) -> Bucket {
        Bucket::v4(CLOUDFLARE_V4_LIST)
    }

    pub fn v6_bucket(&self) -> Bucket {
        Bucket::v6(CLOUDFLARE_V6_LIST)
    }
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            api_url: default_cloudflare_api_url(),
            timeout_secs: default_timeout_secs(),
            skip_empty: false,
        }
    }
}

/// Interface address tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface to read the global IPv6 address from
    pub name: InterfaceName,

    /// IPv6 address list receiving the interface address
    #[serde(default = "default_interface_list")]
    pub list_name: String,

    /// Hostnames kept as static AAAA records pointing at the address
    #[serde(default)]
    pub dns_hostnames: Vec<String>,
}

impl InterfaceConfig {
    /// Create interface tracking with the default list and no DNS names
    pub fn new(name: InterfaceName) -> Self {
        Self {
            name,
            list_name: default_interface_list(),
            dns_hostnames: Vec::new(),
        }
    }

    /// Set the address list name
    pub fn with_list_name(mut self, list_name: impl Into<String>) -> Self {
        self.list_name = list_name.into();
        self
    }

    /// Set the DNS hostnames, dropping blanks and duplicates
    pub fn with_dns_hostnames<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dns_hostnames = normalize_hostnames(hostnames);
        self
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::v6(self.list_name.clone())
    }

    /// Validate the interface settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.list_name.trim().is_empty() {
            return Err(crate::Error::config("Interface list name cannot be empty"));
        }
        if self.list_name == CLOUDFLARE_V6_LIST {
            return Err(crate::Error::config(format!(
                "Interface list name '{}' collides with the Cloudflare IPv6 list",
                self.list_name
            )));
        }
        Ok(())
    }
}

/// Split a comma-separated hostname list
///
/// Entries are trimmed; empty entries and repeats are dropped, first
/// occurrence wins.
pub fn parse_hostname_list(raw: &str) -> Vec<String> {
    normalize_hostnames(raw.split(','))
}

fn normalize_hostnames<I, S>(hostnames: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in hostnames {
        let name = name.as_ref().trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Poll cycle period (in seconds)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Validate the engine settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.check_interval_secs == 0 {
            return Err(crate::Error::config("Check interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_router_host() -> String {
    "192.168.88.1".to_string()
}

fn default_router_port() -> u16 {
    8728
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

fn default_cloudflare_api_url() -> String {
    DEFAULT_CLOUDFLARE_API_URL.to_string()
}

fn default_interface_list() -> String {
    DEFAULT_INTERFACE_LIST.to_string()
}

fn default_check_interval_secs() -> u64 {
    3600
}

fn default_event_channel_capacity() -> usize {
    256
}
