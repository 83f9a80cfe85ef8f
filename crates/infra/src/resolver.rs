//! Request detail resolution.
//!
//! Matched request IDs are turned into full request details through the
//! lookup collaborator. Resolution runs inside the event source's delivery
//! callback, so a failed lookup is logged and dropped rather than retried.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Details of one service request, as returned by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetail {
    pub id: String,
    pub service_name: String,
    pub provider: String,
    #[serde(default)]
    pub consumer: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub service_fee_cap: Option<String>,
    #[serde(default)]
    pub request_height: u64,
    #[serde(default)]
    pub expiration_height: u64,
}

impl RequestDetail {
    pub fn new(id: impl Into<String>, service_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            provider: provider.into(),
            consumer: String::new(),
            input: serde_json::Value::Null,
            service_fee_cap: None,
            request_height: 0,
            expiration_height: 0,
        }
    }
}

/// A request detail paired with the provider it was matched for.
///
/// Consumed exactly once: handed to the run trigger's side-store or dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub detail: RequestDetail,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("request not found: {0}")]
    NotFound(String),
    #[error("lookup service unavailable: {0}")]
    Unavailable(String),
}

/// Remote lookup of request details by request ID.
pub trait RequestDetailLookup: Send + Sync {
    fn query_request(&self, request_id: &str) -> Result<RequestDetail, LookupError>;
}

impl<L> RequestDetailLookup for Arc<L>
where
    L: RequestDetailLookup + ?Sized,
{
    fn query_request(&self, request_id: &str) -> Result<RequestDetail, LookupError> {
        (**self).query_request(request_id)
    }
}

/// Resolves matched IDs, one lookup per ID.
#[derive(Clone)]
pub struct RequestResolver {
    lookup: Arc<dyn RequestDetailLookup>,
}

impl RequestResolver {
    pub fn new(lookup: Arc<dyn RequestDetailLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve `ids` in set order. Failed lookups are logged and skipped.
    pub fn resolve(&self, ids: &BTreeSet<String>, provider: &str) -> Vec<ResolvedRequest> {
        let mut out = Vec::with_capacity(ids.len());

        for id in ids {
            match self.lookup.query_request(id) {
                Ok(detail) => out.push(ResolvedRequest {
                    detail,
                    provider: provider.to_string(),
                }),
                Err(err) => {
                    reqwatch_observability::metrics::inc_lookup_failures();
                    warn!(request_id = %id, provider, error = %err, "dropping unresolvable request");
                }
            }
        }

        out
    }
}

/// In-memory lookup service for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRequestLookup {
    details: RwLock<HashMap<String, RequestDetail>>,
    unavailable: RwLock<BTreeSet<String>>,
    synthesize: bool,
    calls: AtomicUsize,
}

impl InMemoryRequestLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lookup that answers unknown IDs with a placeholder detail.
    pub fn synthetic() -> Self {
        Self {
            synthesize: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, detail: RequestDetail) {
        self.details
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(detail.id.clone(), detail);
    }

    /// Make lookups of `request_id` fail with `Unavailable`.
    pub fn fail_for(&self, request_id: impl Into<String>) {
        self.unavailable
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.into());
    }

    /// Number of lookups served so far, failures included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RequestDetailLookup for InMemoryRequestLookup {
    fn query_request(&self, request_id: &str) -> Result<RequestDetail, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self
            .unavailable
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(request_id)
        {
            return Err(LookupError::Unavailable(format!("lookup of {request_id} failed")));
        }

        let details = self.details.read().unwrap_or_else(PoisonError::into_inner);
        match details.get(request_id) {
            Some(detail) => Ok(detail.clone()),
            None if self.synthesize => Ok(RequestDetail::new(request_id, "", "")),
            None => Err(LookupError::NotFound(request_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_each_id_once() {
        let lookup = Arc::new(InMemoryRequestLookup::new());
        lookup.insert(RequestDetail::new("a", "svcA", "p1"));
        lookup.insert(RequestDetail::new("b", "svcA", "p1"));

        let resolver = RequestResolver::new(lookup.clone());
        let resolved = resolver.resolve(&ids(&["a", "b"]), "p1");

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].detail.id, "a");
        assert_eq!(resolved[1].provider, "p1");
        assert_eq!(lookup.calls(), 2);
    }

    #[test]
    fn failed_lookup_does_not_abort_the_rest() {
        let lookup = Arc::new(InMemoryRequestLookup::new());
        lookup.insert(RequestDetail::new("a", "svcA", "p1"));
        lookup.insert(RequestDetail::new("c", "svcA", "p1"));
        lookup.insert(RequestDetail::new("b", "svcA", "p1"));
        lookup.fail_for("b");

        let resolver = RequestResolver::new(lookup.clone());
        let resolved: Vec<_> = resolver
            .resolve(&ids(&["a", "b", "c", "missing"]), "p1")
            .into_iter()
            .map(|r| r.detail.id)
            .collect();

        assert_eq!(resolved, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(lookup.calls(), 4);
    }

    #[test]
    fn synthetic_lookup_answers_anything() {
        let lookup = InMemoryRequestLookup::synthetic();
        let detail = lookup.query_request("req-9").unwrap();
        assert_eq!(detail.id, "req-9");
    }
}
