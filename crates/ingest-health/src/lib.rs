//! C8 health and failover supervisor, C9 tier and capability policy.
//!
//! `supervisor` owns the `FailoverLatch` writer side and the periodic
//! probe loop; `capability` owns the credential triple and the derived
//! `CapabilityProfile`, fanning changes out to the rate buckets (C1) and
//! symbol manager (C5).

pub mod analytical;
pub mod capability;
pub mod error;
pub mod supervisor;

pub use analytical::{as_liveness_probe, AnalyticalStoreProbe, HttpAnalyticalProbe};
pub use capability::{CapabilityChange, CapabilityPolicy};
pub use error::{HealthError, HealthResult};
pub use supervisor::{HealthSnapshot, HealthStatus, HealthSupervisor, Liveness, LivenessProbe};
