use std::io;

use crate::reactor::ChannelId;
use crate::rule::{AddressFamily, ForwardingRule};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid {family} address: {address}")]
    InvalidAddress {
        family: AddressFamily,
        address: String,
    },
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("forwarding rule is missing its {0} endpoint")]
    MissingEndpoint(&'static str),
    #[error("invalid forward specification: {0}")]
    InvalidForward(String),
    #[error("channel {0} is already registered")]
    ChannelInUse(ChannelId),
    #[error("reactor thread panicked")]
    ReactorPanicked,
    #[error("io issue encountered")]
    Io(#[from] io::Error),
    #[error("failed to parse config")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejected submission. The rule is handed back to the caller, who may retry
/// or discard it.
#[derive(thiserror::Error, Debug)]
pub enum SubmitError {
    #[error("port-forward channel is full, rule {0} not queued")]
    ResourceExhausted(ForwardingRule),
    #[error("reactor is not running, rule {0} not queued")]
    Closed(ForwardingRule),
}

impl SubmitError {
    pub fn into_rule(self) -> ForwardingRule {
        match self {
            SubmitError::ResourceExhausted(rule) | SubmitError::Closed(rule) => rule,
        }
    }
}
