use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Error, Result};
use crate::reactor::DEFAULT_CHANNEL_CAPACITY;
use crate::remap::LoopbackRemap;
use crate::rule::{AddressFamily, ForwardingRule, RuleBuilder, SocketType};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PortForwardConfig {
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub remap: RemapConfig,
    #[serde(default)]
    #[serde(rename = "forward")]
    pub forwards: Vec<ForwardConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReactorConfig {
    #[serde(default = "default_channel_capacity")]
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        ReactorConfig {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RemapConfig {
    #[serde(default = "default_host_loopback_ipv4")]
    #[serde(rename = "host-loopback-ipv4")]
    pub host_loopback_ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    #[serde(rename = "host-loopback-ipv6")]
    pub host_loopback_ipv6: Option<Ipv6Addr>,
}

impl Default for RemapConfig {
    fn default() -> Self {
        RemapConfig {
            host_loopback_ipv4: default_host_loopback_ipv4(),
            host_loopback_ipv6: None,
        }
    }
}

impl RemapConfig {
    pub fn policy(&self) -> LoopbackRemap {
        LoopbackRemap::new(
            self.host_loopback_ipv4.map(Into::into),
            self.host_loopback_ipv6.map(Into::into),
        )
    }
}

/// One preconfigured forward, e.g.
/// `{ name = "ssh", protocol = "tcp", source = "0.0.0.0:2222", destination = "10.0.2.15:22" }`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ForwardConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub protocol: SocketType,
    #[serde(default)]
    pub family: Option<AddressFamily>,
    pub source: String,
    pub destination: String,
}

impl ForwardConfig {
    pub fn family(&self) -> AddressFamily {
        self.family
            .unwrap_or_else(|| AddressFamily::of_endpoint(&self.source))
    }

    pub fn rule(&self) -> Result<ForwardingRule> {
        RuleBuilder::new(self.family(), self.protocol)
            .source_endpoint(self.source.as_str())
            .destination_endpoint(self.destination.as_str())
            .build()
    }
}

/// Parses the command-line form `protocol,source,destination`.
impl FromStr for ForwardConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s.split(',').map(str::trim).collect::<Vec<_>>();
        let [protocol, source, destination] = parts.as_slice() else {
            return Err(Error::InvalidForward(s.to_string()));
        };
        Ok(ForwardConfig {
            name: None,
            protocol: SocketType::from_str(protocol)?,
            family: None,
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_host_loopback_ipv4() -> Option<Ipv4Addr> {
    Some(Ipv4Addr::new(10, 0, 2, 2))
}

impl PortForwardConfig {
    pub async fn load(path: &Path) -> Result<PortForwardConfig> {
        if path.exists() {
            let content = fs::read_to_string(path).await?;
            Self::parse(&content)
        } else {
            Ok(PortForwardConfig::default())
        }
    }

    pub fn parse(content: &str) -> Result<PortForwardConfig> {
        Ok(toml::from_str(content)?)
    }

    /// Builds every preconfigured forward, stopping at the first invalid one.
    pub fn rules(&self) -> Result<Vec<ForwardingRule>> {
        self.forwards.iter().map(ForwardConfig::rule).collect()
    }
}
