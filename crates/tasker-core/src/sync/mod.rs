//! Reconciliation between the local and remote stores

mod identity;
mod reconcile;

pub use identity::{
    detect_identity_conflicts, ConflictResolution, IdentityConflict, IdentityReport,
    UsernameRejection, UsernameResolver,
};
pub use reconcile::{ReconciliationService, SyncReport};
