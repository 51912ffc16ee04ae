pub mod reconcile_service;

pub use reconcile_service::{ReconcileError, ReconcileService, RunReport};
