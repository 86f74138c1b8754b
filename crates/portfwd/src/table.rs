use log::{info, warn};

use crate::rule::{ForwardingRule, SocketType};

/// A protocol-specific table of live forwards. Only the rule applier writes
/// to it, and only from the reactor thread.
pub trait RuleTable: Send {
    fn add(&mut self, rule: &ForwardingRule);

    fn remove(&mut self, rule: &ForwardingRule);
}

pub struct RuleTables {
    pub stream: Box<dyn RuleTable>,
    pub datagram: Box<dyn RuleTable>,
}

impl RuleTables {
    pub fn new(stream: Box<dyn RuleTable>, datagram: Box<dyn RuleTable>) -> Self {
        RuleTables { stream, datagram }
    }

    pub fn for_socket_type(&mut self, socket_type: SocketType) -> &mut dyn RuleTable {
        match socket_type {
            SocketType::Stream => self.stream.as_mut(),
            SocketType::Datagram => self.datagram.as_mut(),
        }
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        RuleTables::new(
            Box::new(ForwardingTable::new(SocketType::Stream)),
            Box::new(ForwardingTable::new(SocketType::Datagram)),
        )
    }
}

/// In-memory forward registry. Duplicate adds and removes of unknown rules
/// are logged and otherwise ignored.
#[derive(Debug)]
pub struct ForwardingTable {
    socket_type: SocketType,
    rules: Vec<ForwardingRule>,
}

impl ForwardingTable {
    pub fn new(socket_type: SocketType) -> Self {
        ForwardingTable {
            socket_type,
            rules: Vec::new(),
        }
    }

    pub fn rules(&self) -> &[ForwardingRule] {
        &self.rules
    }

    pub fn contains(&self, rule: &ForwardingRule) -> bool {
        self.rules.contains(rule)
    }
}

impl RuleTable for ForwardingTable {
    fn add(&mut self, rule: &ForwardingRule) {
        if rule.socket_type() != self.socket_type {
            warn!("{} table refused foreign rule {}", self.socket_type, rule);
            return;
        }

        if self.contains(rule) {
            warn!("ignoring duplicate forward {}", rule);
            return;
        }

        info!("forwarding {}", rule);
        self.rules.push(rule.clone());
    }

    fn remove(&mut self, rule: &ForwardingRule) {
        let Some(index) = self.rules.iter().position(|existing| existing == rule) else {
            warn!("no forward matches {}", rule);
            return;
        };
        info!("stopped forwarding {}", rule);
        self.rules.remove(index);
    }
}
