use std::time::Duration;

use log::{debug, info, warn};

use crate::config::PortForwardConfig;
use crate::dispatch::PortForwarder;
use crate::error::{Result, SubmitError};
use crate::reactor::{Reactor, ReactorHandle};
use crate::remap::SourceResolver;
use crate::table::RuleTables;

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod reactor;
pub mod remap;
pub mod rule;
pub mod table;

const PRECONFIGURED_RETRY_DELAY: Duration = Duration::from_millis(1);

/// A running port-forward subsystem: the reactor thread owning the rule
/// tables, a producer handle for rule changes, and the source resolver used
/// during connection setup.
pub struct PortForwardService {
    pub forwarder: PortForwarder,
    pub resolver: SourceResolver,
    reactor: ReactorHandle,
}

impl PortForwardService {
    pub fn launch(config: &PortForwardConfig, tables: RuleTables) -> Result<PortForwardService> {
        let mut reactor = Reactor::with_capacity(config.reactor.channel_capacity);
        let forwarder = PortForwarder::init(&mut reactor, tables)?;
        let reactor = reactor.launch()?;
        let resolver = SourceResolver::with_policy(config.remap.policy());
        Ok(PortForwardService {
            forwarder,
            resolver,
            reactor,
        })
    }

    /// Submits the configured forwards through the regular dispatch path,
    /// waiting for the reactor to drain the channel whenever it is full.
    /// Invalid entries are logged and skipped; a stopped reactor ends the
    /// load. Returns how many were queued.
    pub fn load_preconfigured(&self, config: &PortForwardConfig) -> usize {
        let mut submitted = 0;
        for forward in &config.forwards {
            let name = forward.name.as_deref().unwrap_or("unnamed");
            let rule = match forward.rule() {
                Ok(rule) => rule,
                Err(error) => {
                    warn!("skipping forward {}: {}", name, error);
                    continue;
                }
            };

            let mut pending = rule;
            loop {
                match self.forwarder.add_rule(pending) {
                    Ok(()) => {
                        submitted += 1;
                        break;
                    }
                    Err(SubmitError::ResourceExhausted(rule)) => {
                        debug!("port-forward channel full, retrying forward {}", name);
                        pending = rule;
                        std::thread::sleep(PRECONFIGURED_RETRY_DELAY);
                    }
                    Err(error @ SubmitError::Closed(_)) => {
                        warn!("failed to queue forward {}: {}", name, error);
                        info!("queued {} preconfigured forward(s)", submitted);
                        return submitted;
                    }
                }
            }
        }
        info!("queued {} preconfigured forward(s)", submitted);
        submitted
    }

    pub fn shutdown(self) -> Result<()> {
        self.reactor.shutdown()
    }
}
