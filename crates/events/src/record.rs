//! Event records delivered per block.
//!
//! Raw events are attribute-keyed and loosely shaped. The records the tracker
//! cares about are decoded once, here, into [`ProviderRequestRecord`]; a
//! malformed request list is kept as a value instead of failing the block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted once per provider when a batch of service requests is created.
pub const NEW_BATCH_REQUEST_PROVIDER: &str = "new_batch_request_provider";

/// Emitted once per batch of service requests.
pub const NEW_BATCH_REQUEST: &str = "new_batch_request";

const ATTR_SERVICE_NAME: &str = "service_name";
const ATTR_PROVIDER: &str = "provider";
const ATTR_REQUESTS: &str = "requests";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

impl EventAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single application event: a kind plus ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute::new(key, value));
        self
    }

    /// Value of the first attribute with `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Events of one block (end-block results).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvents {
    pub height: u64,
    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl BlockEvents {
    pub fn new(height: u64, events: Vec<RawEvent>) -> Self {
        Self {
            height,
            time: Utc::now(),
            events,
        }
    }

    /// Events of the given kind, in block order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a RawEvent> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Request identifiers carried by a provider record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestIds {
    Decoded(Vec<String>),
    /// The attribute was missing or not a JSON array of strings.
    Malformed(String),
}

impl RequestIds {
    /// Decode the JSON-array-encoded `requests` attribute.
    pub fn decode(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return RequestIds::Malformed("missing requests attribute".to_string());
        };
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(ids) => RequestIds::Decoded(ids),
            Err(e) => RequestIds::Malformed(e.to_string()),
        }
    }

    /// Decoded identifiers; empty when malformed.
    pub fn ids(&self) -> &[String] {
        match self {
            RequestIds::Decoded(ids) => ids,
            RequestIds::Malformed(_) => &[],
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RequestIds::Malformed(_))
    }
}

/// Typed view of a `new_batch_request_provider` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequestRecord {
    pub service_name: String,
    pub provider: String,
    pub request_ids: RequestIds,
}

impl ProviderRequestRecord {
    /// Decode a raw event. Returns `None` for other event kinds or when the
    /// service name / provider attributes are absent.
    pub fn decode(event: &RawEvent) -> Option<Self> {
        if event.kind != NEW_BATCH_REQUEST_PROVIDER {
            return None;
        }
        Some(Self {
            service_name: event.attribute(ATTR_SERVICE_NAME)?.to_string(),
            provider: event.attribute(ATTR_PROVIDER)?.to_string(),
            request_ids: RequestIds::decode(event.attribute(ATTR_REQUESTS)),
        })
    }

    /// Build the raw event for this record (tests, replay fixtures).
    pub fn to_raw(service_name: &str, provider: &str, requests_attr: &str) -> RawEvent {
        RawEvent::new(NEW_BATCH_REQUEST_PROVIDER)
            .with_attribute(ATTR_SERVICE_NAME, service_name)
            .with_attribute(ATTR_PROVIDER, provider)
            .with_attribute(ATTR_REQUESTS, requests_attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_provider_record() {
        let raw = ProviderRequestRecord::to_raw("svcA", "p1", r#"["a","b"]"#);
        let rec = ProviderRequestRecord::decode(&raw).unwrap();

        assert_eq!(rec.service_name, "svcA");
        assert_eq!(rec.provider, "p1");
        assert_eq!(rec.request_ids.ids(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn other_kinds_are_not_provider_records() {
        let raw = RawEvent::new(NEW_BATCH_REQUEST).with_attribute("service_name", "svcA");
        assert!(ProviderRequestRecord::decode(&raw).is_none());
    }

    #[test]
    fn bad_request_lists_are_kept_as_values() {
        assert!(RequestIds::decode(Some("not json")).is_malformed());
        assert!(RequestIds::decode(Some("[1, 2]")).is_malformed());
        assert!(RequestIds::decode(None).ids().is_empty());
    }

    #[test]
    fn first_attribute_wins() {
        let raw = RawEvent::new("x")
            .with_attribute("k", "first")
            .with_attribute("k", "second");
        assert_eq!(raw.attribute("k"), Some("first"));
    }
}
