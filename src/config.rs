use crate::events::EventKind;
use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[cfg(feature = "http-server")]
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub modem: ModemConfig,

    #[cfg(feature = "http-server")]
    #[serde(default)]
    pub http: HTTPConfig,

    #[serde(default)]
    pub webhooks: Option<Vec<ConfiguredWebhook>>,
}
impl AppConfig {
    pub fn load(config_filepath: Option<PathBuf>) -> Result<Self> {
        let config_path = config_filepath.unwrap_or_else(|| PathBuf::from("config.toml"));

        let config_content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

        let config: AppConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse TOML config file: {config_path:?}"))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModemConfig {
    #[serde(default = "default_modem_device")]
    pub device: String,

    #[serde(default = "default_modem_baud")]
    pub baud_rate: u32,

    /// Storage bank the modem reads/deletes stored SMS from (`AT+CPMS` mem1).
    #[serde(default = "default_mem_bank")]
    pub mem1_bank: String,

    /// Storage bank the modem writes SMS to and receives incoming SMS into
    /// (`AT+CPMS` mem2/mem3).
    #[serde(default = "default_mem_bank")]
    pub mem2_bank: String,

    /// The size of Command bounded mpsc sender, should be low. eg: 32
    #[serde(default = "default_modem_cmd_buffer_size")]
    pub cmd_channel_buffer_size: usize,

    #[serde(default = "default_modem_read_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_modem_read_buffer_size")]
    pub line_buffer_size: usize,
}
impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            device: default_modem_device(),
            baud_rate: default_modem_baud(),
            mem1_bank: default_mem_bank(),
            mem2_bank: default_mem_bank(),
            cmd_channel_buffer_size: default_modem_cmd_buffer_size(),
            read_buffer_size: default_modem_read_buffer_size(),
            line_buffer_size: default_modem_read_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfiguredWebhook {
    pub url: String,
    pub expected_status: Option<u16>,

    /// By default, this is only IncomingMessage.
    #[serde(default = "default_webhook_events")]
    pub events: Vec<EventKind>,

    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,

    #[serde(deserialize_with = "deserialize_optional_existing_file")]
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
}
impl ConfiguredWebhook {
    pub fn get_header_map(&self) -> Result<Option<HeaderMap>> {
        let map = if let Some(headers) = &self.headers {
            headers
        } else {
            return Ok(None);
        };

        let mut out = HeaderMap::with_capacity(map.len());
        for (k, v) in map {
            out.insert(
                reqwest::header::HeaderName::from_str(k)?,
                reqwest::header::HeaderValue::from_str(v)?,
            );
        }

        Ok(Some(out))
    }
}

#[cfg(feature = "http-server")]
#[derive(Debug, Clone, Deserialize)]
pub struct HTTPConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_http_address")]
    pub address: SocketAddr,

    #[serde(default = "default_true")]
    pub send_international_format_only: bool,

    #[serde(default = "default_true")]
    pub require_authentication: bool,

    /// Bearer token required by [`crate::auth::BearerTokenAuthorizer`] when
    /// `require_authentication` is set. Ignored (everything allowed) if unset.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_true")]
    pub websocket_enabled: bool,

    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub tls: Option<TLSConfig>,
}
#[cfg(feature = "http-server")]
impl Default for HTTPConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_http_address(),
            send_international_format_only: default_true(),
            require_authentication: default_true(),
            auth_token: None,
            websocket_enabled: default_true(),
            phone_number: None,
            tls: None,
        }
    }
}
#[cfg_attr(
    not(any(feature = "tls-rustls", feature = "tls-native")),
    allow(dead_code)
)]
#[cfg(feature = "http-server")]
#[derive(Debug, Clone, Deserialize)]
pub struct TLSConfig {
    #[serde(deserialize_with = "deserialize_existing_file")]
    pub certificate_path: PathBuf,

    #[serde(deserialize_with = "deserialize_existing_file")]
    pub key_path: PathBuf,
}

fn default_modem_device() -> String {
    "/dev/ttyS0".to_string()
}
fn default_modem_baud() -> u32 {
    115200
}
fn default_mem_bank() -> String {
    "ME".to_string()
}
fn default_modem_cmd_buffer_size() -> usize {
    32
}
fn default_modem_read_buffer_size() -> usize {
    4096
}
fn default_webhook_events() -> Vec<EventKind> {
    vec![EventKind::IncomingMessage]
}
fn default_true() -> bool {
    true
}

#[cfg(feature = "http-server")]
fn default_http_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 3000)
}

fn deserialize_existing_file<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path = PathBuf::deserialize(deserializer)?;
    if !path.exists() {
        return Err(serde::de::Error::custom(format!(
            "File does not exist: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(serde::de::Error::custom(format!(
            "Path is not a file: {}",
            path.display()
        )));
    }
    Ok(path)
}

fn deserialize_optional_existing_file<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path_opt = Option::<String>::deserialize(deserializer)?;
    match path_opt {
        Some(path_str) => {
            let path_deserializer = serde::de::value::StringDeserializer::new(path_str);
            Ok(Some(deserialize_existing_file(path_deserializer)?))
        }
        None => Ok(None),
    }
}
