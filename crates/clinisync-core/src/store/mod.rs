// ── Reactive data store ──
//
// Versioned alert storage plus the notification inbox, with push-based
// change notification.

mod alert_store;
mod collection;
mod data_store;

pub use alert_store::{AlertStore, ApplyOutcome, FetchTicket, SnapshotOutcome};
pub use data_store::DataStore;
