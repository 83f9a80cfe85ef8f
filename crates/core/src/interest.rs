//! The provider/service pair a job listens for.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A (provider identity, service name) pair a job wants request events for.
///
/// The provider is a bech32-style account address as it appears in event
/// attributes; it is compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawInterest")]
pub struct Interest {
    provider: String,
    service_name: String,
}

impl Interest {
    /// Build an interest, rejecting blank fields.
    pub fn new(provider: impl Into<String>, service_name: impl Into<String>) -> DomainResult<Self> {
        let provider = provider.into().trim().to_string();
        let service_name = service_name.into().trim().to_string();

        if provider.is_empty() {
            return Err(DomainError::validation("interest provider must not be empty"));
        }
        if service_name.is_empty() {
            return Err(DomainError::validation("interest service name must not be empty"));
        }

        Ok(Self {
            provider,
            service_name,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Wire shape of an [`Interest`]; always validated through `Interest::new`.
#[derive(Deserialize)]
struct RawInterest {
    provider: String,
    service_name: String,
}

impl TryFrom<RawInterest> for Interest {
    type Error = DomainError;

    fn try_from(raw: RawInterest) -> DomainResult<Self> {
        Interest::new(raw.provider, raw.service_name)
    }
}

impl core::fmt::Display for Interest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.service_name, self.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_keeps_fields() {
        let interest = Interest::new(" iaa1provider ", "svcA\n").unwrap();
        assert_eq!(interest.provider(), "iaa1provider");
        assert_eq!(interest.service_name(), "svcA");
        assert_eq!(interest.to_string(), "svcA@iaa1provider");
    }

    #[test]
    fn rejects_blank_provider_or_service() {
        assert!(matches!(Interest::new("  ", "svcA"), Err(DomainError::Validation(_))));
        assert!(matches!(Interest::new("p1", ""), Err(DomainError::Validation(_))));
    }

    #[test]
    fn deserializing_trims_and_validates() {
        let interest: Interest =
            serde_json::from_str(r#"{"provider":" p1 ","service_name":"svcA"}"#).unwrap();
        assert_eq!(interest.provider(), "p1");

        let blank = serde_json::from_str::<Interest>(r#"{"provider":"  ","service_name":"svcA"}"#);
        assert!(blank.is_err());
    }
}
