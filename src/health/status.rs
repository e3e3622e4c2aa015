//! Aggregated reachability of the external services.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a probed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceId {
    Recognition,
    Generation,
    Synthesis,
    Animation,
    Coordination,
}

impl ServiceId {
    pub const ALL: [ServiceId; 5] = [
        ServiceId::Recognition,
        ServiceId::Generation,
        ServiceId::Synthesis,
        ServiceId::Animation,
        ServiceId::Coordination,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Recognition => "recognition",
            ServiceId::Generation => "generation",
            ServiceId::Synthesis => "synthesis",
            ServiceId::Animation => "animation",
            ServiceId::Coordination => "coordination",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent probe of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub up: bool,
    pub checked_at: DateTime<Utc>,
}

/// Reachability of every configured service.
///
/// A status is built in one go from a complete set of probe results
/// ([`ServiceStatus::from_results`]) and then only read; a new health cycle
/// produces a new value instead of patching the old one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    services: BTreeMap<ServiceId, ServiceHealth>,
}

impl ServiceStatus {
    pub fn from_results(results: impl IntoIterator<Item = (ServiceId, ServiceHealth)>) -> Self {
        Self {
            services: results.into_iter().collect(),
        }
    }

    /// `None` when the service has not been probed yet.
    pub fn get(&self, id: ServiceId) -> Option<ServiceHealth> {
        self.services.get(&id).copied()
    }

    pub fn is_up(&self, id: ServiceId) -> bool {
        self.get(id).is_some_and(|h| h.up)
    }

    pub fn all_up(&self) -> bool {
        !self.services.is_empty() && self.services.values().all(|h| h.up)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, ServiceHealth)> + '_ {
        self.services.iter().map(|(id, h)| (*id, *h))
    }

    /// Services currently reported down, in identifier order.
    pub fn down(&self) -> Vec<ServiceId> {
        self.iter().filter(|(_, h)| !h.up).map(|(id, _)| id).collect()
    }
}
