//! Business logic services.

pub mod entitlement;

pub use entitlement::{
    EntitlementObserver, EntitlementService, EntitlementUpdate, ProcessedEvent,
};
