//! Activity window: when a job may produce runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Time range during which a job is eligible to run. Either bound may be open.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct ActivityWindow {
    start_at: Option<DateTime<Utc>>,
    end_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawWindow {
    #[serde(default)]
    start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    end_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawWindow> for ActivityWindow {
    type Error = DomainError;

    fn try_from(raw: RawWindow) -> DomainResult<Self> {
        ActivityWindow::new(raw.start_at, raw.end_at)
    }
}

impl ActivityWindow {
    pub fn new(start_at: Option<DateTime<Utc>>, end_at: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(start), Some(end)) = (start_at, end_at) {
            if end < start {
                return Err(DomainError::invariant(format!(
                    "activity window ends ({end}) before it starts ({start})"
                )));
            }
        }
        Ok(Self { start_at, end_at })
    }

    /// A window with no bounds: always active.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn start_at(&self) -> Option<DateTime<Utc>> {
        self.start_at
    }

    pub fn end_at(&self) -> Option<DateTime<Utc>> {
        self.end_at
    }

    /// True once `now` has reached the start bound (or there is none).
    pub fn started(&self, now: DateTime<Utc>) -> bool {
        self.start_at.map_or(true, |start| now >= start)
    }

    /// True once `now` is past the end bound.
    pub fn ended(&self, now: DateTime<Utc>) -> bool {
        self.end_at.map_or(false, |end| now > end)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.started(now) && !self.ended(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn open_window_is_always_active() {
        let w = ActivityWindow::unbounded();
        assert!(w.is_active(Utc::now()));
    }

    #[test]
    fn bounded_window_edges() {
        let now = Utc::now();
        let w = ActivityWindow::new(Some(now - Duration::hours(1)), Some(now + Duration::hours(1))).unwrap();

        assert!(w.is_active(now));
        assert!(!w.started(now - Duration::hours(2)));
        assert!(w.ended(now + Duration::hours(2)));
        // The end bound itself is still inside the window.
        assert!(!w.ended(now + Duration::hours(1)));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let now = Utc::now();
        let err = ActivityWindow::new(Some(now), Some(now - Duration::seconds(1))).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn deserializing_rejects_inverted_bounds() {
        let inverted = r#"{"start_at":"2024-01-02T00:00:00Z","end_at":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<ActivityWindow>(inverted).is_err());

        let open: ActivityWindow = serde_json::from_str(r#"{"end_at":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(open.start_at(), None);
        assert!(open.end_at().is_some());
    }
}
