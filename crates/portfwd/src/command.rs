use std::fmt::Display;

use crate::rule::ForwardingRule;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Intent {
    Add,
    Remove,
}

impl Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Add => write!(f, "add"),
            Intent::Remove => write!(f, "remove"),
        }
    }
}

/// A rule in transit from a submitting thread to the reactor. It is moved
/// into the port-forward channel on submission and consumed by the rule
/// applier, so each command is owned by exactly one side at a time.
#[derive(Debug)]
pub struct RuleCommand {
    rule: ForwardingRule,
    intent: Intent,
}

impl RuleCommand {
    pub fn new(rule: ForwardingRule, intent: Intent) -> Self {
        RuleCommand { rule, intent }
    }

    pub fn into_rule(self) -> ForwardingRule {
        self.rule
    }

    pub fn into_parts(self) -> (ForwardingRule, Intent) {
        (self.rule, self.intent)
    }
}

impl Display for RuleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.intent, self.rule)
    }
}
