// ABOUTME: Library root for crm-sync-bridge
// ABOUTME: Bidirectional contact/company sync between two CRMs with loop prevention

pub mod commands;
pub mod config;
pub mod mapping;
pub mod model;
pub mod remote;
pub mod sync;

pub use config::BridgeConfig;
pub use model::{ChangeKind, EntityKind, System};
pub use sync::Reconciler;
