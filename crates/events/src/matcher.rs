//! Request matching: which request IDs in a block belong to an interest.

use std::collections::BTreeSet;

use tracing::debug;

use reqwatch_core::Interest;

use crate::record::{BlockEvents, ProviderRequestRecord, RawEvent};

/// Request IDs announced for `interest` by the provider records in `events`.
///
/// Only `new_batch_request_provider` records whose service name and provider
/// equal the interest's contribute. A malformed request list contributes
/// nothing. Duplicates across records collapse.
pub fn match_requests(events: &[RawEvent], interest: &Interest) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();

    for record in events.iter().filter_map(ProviderRequestRecord::decode) {
        if record.service_name != interest.service_name() || record.provider != interest.provider() {
            continue;
        }
        if record.request_ids.is_malformed() {
            debug!(
                provider = %record.provider,
                service_name = %record.service_name,
                "skipping malformed request list"
            );
            continue;
        }
        ids.extend(record.request_ids.ids().iter().cloned());
    }

    ids
}

/// Matcher pinned to one interest.
#[derive(Debug, Clone)]
pub struct EventMatcher {
    interest: Interest,
}

impl EventMatcher {
    pub fn new(interest: Interest) -> Self {
        Self { interest }
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn match_block(&self, block: &BlockEvents) -> BTreeSet<String> {
        match_requests(&block.events, &self.interest)
    }
}
