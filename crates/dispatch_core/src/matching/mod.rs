pub mod first_registered;
pub mod policy;
pub mod round_robin;

use std::sync::Arc;

pub use first_registered::FirstRegistered;
pub use policy::MatchingPolicy;
pub use round_robin::RoundRobin;

/// Which matching policy the coordinator runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchingPolicyKind {
    #[default]
    FirstRegistered,
    RoundRobin,
}

impl MatchingPolicyKind {
    pub fn build(self) -> Arc<dyn MatchingPolicy> {
        match self {
            MatchingPolicyKind::FirstRegistered => Arc::new(FirstRegistered),
            MatchingPolicyKind::RoundRobin => Arc::new(RoundRobin::default()),
        }
    }
}
