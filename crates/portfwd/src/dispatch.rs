use log::{debug, trace};
use tokio::sync::mpsc::error::TrySendError;

use crate::command::{Intent, RuleCommand};
use crate::error::{Result, SubmitError};
use crate::reactor::{ChannelHandler, ChannelId, ChannelSender, Reactor};
use crate::rule::ForwardingRule;
use crate::table::RuleTables;

type SubmitResult = std::result::Result<(), SubmitError>;

/// Producer handle for the port-forward channel. Cheap to clone and usable
/// from any thread; submissions are fire-and-forget and return before the
/// rule is applied.
#[derive(Clone)]
pub struct PortForwarder {
    sender: ChannelSender<RuleCommand>,
}

impl PortForwarder {
    /// Registers the port-forward channel on `reactor`, handing `tables` to the
    /// rule applier. Fails if the reactor already carries a port-forward
    /// channel. Uniqueness is per reactor: a process running a single reactor
    /// has a single port-forward channel, but separate reactors each accept
    /// their own.
    pub fn init(reactor: &mut Reactor, tables: RuleTables) -> Result<Self> {
        let sender = reactor.add_channel(ChannelId::PortForward, RuleApplier::new(tables))?;
        Ok(PortForwarder { sender })
    }

    pub fn submit(&self, rule: ForwardingRule, intent: Intent) -> SubmitResult {
        let command = RuleCommand::new(rule, intent);
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                trace!("port-forward channel full, returning {}", command);
                Err(SubmitError::ResourceExhausted(command.into_rule()))
            }
            Err(TrySendError::Closed(command)) => {
                trace!("port-forward channel closed, returning {}", command);
                Err(SubmitError::Closed(command.into_rule()))
            }
        }
    }

    pub fn add_rule(&self, rule: ForwardingRule) -> SubmitResult {
        self.submit(rule, Intent::Add)
    }

    pub fn remove_rule(&self, rule: ForwardingRule) -> SubmitResult {
        self.submit(rule, Intent::Remove)
    }
}

/// Consumer side of the port-forward channel. Sole writer of the rule
/// tables; outcomes of the table operations are not reported back.
pub struct RuleApplier {
    tables: RuleTables,
}

impl RuleApplier {
    pub fn new(tables: RuleTables) -> Self {
        RuleApplier { tables }
    }

    pub fn apply(&mut self, command: RuleCommand) {
        debug!("applying port-forward command: {}", command);
        let (rule, intent) = command.into_parts();
        let table = self.tables.for_socket_type(rule.socket_type());
        match intent {
            Intent::Add => table.add(&rule),
            Intent::Remove => table.remove(&rule),
        }
    }
}

impl ChannelHandler for RuleApplier {
    type Message = RuleCommand;

    fn receive(&mut self, message: RuleCommand) {
        self.apply(message);
    }
}
