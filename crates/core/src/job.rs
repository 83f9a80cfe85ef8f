//! Job specifications as seen by the tracker.
//!
//! Jobs are owned by external storage; the tracker only reads them. A job is
//! triggered by one or more initiators, and only `ServiceRequest` initiators
//! carry an [`Interest`] the tracker subscribes for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::JobId;
use crate::interest::Interest;
use crate::window::ActivityWindow;

/// Initiator kind, used to enumerate jobs from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatorKind {
    /// Triggered by on-chain service requests addressed to a provider.
    ServiceRequest,
    /// Triggered over HTTP.
    Web,
    /// Triggered on a schedule.
    Cron,
}

impl core::fmt::Display for InitiatorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            InitiatorKind::ServiceRequest => "service_request",
            InitiatorKind::Web => "web",
            InitiatorKind::Cron => "cron",
        };
        f.write_str(name)
    }
}

/// What starts a run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Initiator {
    ServiceRequest(Interest),
    Web,
    Cron { schedule: String },
}

impl Initiator {
    pub fn kind(&self) -> InitiatorKind {
        match self {
            Initiator::ServiceRequest(_) => InitiatorKind::ServiceRequest,
            Initiator::Web => InitiatorKind::Web,
            Initiator::Cron { .. } => InitiatorKind::Cron,
        }
    }

    pub fn interest(&self) -> Option<&Interest> {
        match self {
            Initiator::ServiceRequest(interest) => Some(interest),
            _ => None,
        }
    }
}

/// A job specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Human-readable name, used in logs only
    #[serde(default)]
    pub name: String,
    /// When the job may produce runs
    #[serde(default)]
    pub window: ActivityWindow,
    /// Initiators, in declaration order
    pub initiators: Vec<Initiator>,
    /// When the job was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job with no initiators and an unbounded window.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            window: ActivityWindow::unbounded(),
            initiators: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Use a fixed identifier (tests, imports).
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_window(mut self, window: ActivityWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_initiator(mut self, initiator: Initiator) -> Self {
        self.initiators.push(initiator);
        self
    }

    /// Shorthand for adding a `ServiceRequest` initiator.
    pub fn with_interest(self, interest: Interest) -> Self {
        self.with_initiator(Initiator::ServiceRequest(interest))
    }

    pub fn has_initiator(&self, kind: InitiatorKind) -> bool {
        self.initiators.iter().any(|i| i.kind() == kind)
    }

    /// Interests declared by the job's `ServiceRequest` initiators.
    pub fn interests(&self) -> impl Iterator<Item = &Interest> {
        self.initiators.iter().filter_map(Initiator::interest)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.window.is_active(now)
    }
}
