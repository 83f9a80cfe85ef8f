//! Subscription filter predicates.

use serde::{Deserialize, Serialize};

use reqwatch_core::Interest;

use crate::record::{BlockEvents, NEW_BATCH_REQUEST, NEW_BATCH_REQUEST_PROVIDER};

/// Equality test on one attribute of one event kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub event_kind: String,
    pub attribute_key: String,
    pub value: String,
}

impl Condition {
    pub fn equals(event_kind: impl Into<String>, attribute_key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_kind: event_kind.into(),
            attribute_key: attribute_key.into(),
            value: value.into(),
        }
    }

    /// True when some event of the block satisfies this condition.
    pub fn holds(&self, block: &BlockEvents) -> bool {
        block
            .of_kind(&self.event_kind)
            .any(|e| e.attribute(&self.attribute_key) == Some(self.value.as_str()))
    }
}

impl core::fmt::Display for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}='{}'", self.event_kind, self.attribute_key, self.value)
    }
}

/// Conjunction of conditions; a block matches when every condition holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventQuery {
    conditions: Vec<Condition>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Filter for blocks carrying requests addressed to `interest`.
    pub fn for_interest(interest: &Interest) -> Self {
        Self::new()
            .and(Condition::equals(NEW_BATCH_REQUEST_PROVIDER, "provider", interest.provider()))
            .and(Condition::equals(NEW_BATCH_REQUEST, "service_name", interest.service_name()))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// An empty query matches every block.
    pub fn matches(&self, block: &BlockEvents) -> bool {
        self.conditions.iter().all(|c| c.holds(block))
    }
}

impl core::fmt::Display for EventQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
