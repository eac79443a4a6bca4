// ── Domain model ──
//
// Canonical alert and notification types. Wire enums arrive as strings;
// `crate::convert` turns them into the typed forms below.

pub mod alert;
pub mod filter;
pub mod notification;

pub use alert::{Alert, AlertCategory, AlertId, AlertSeverity, AlertStatus, Revision};
pub use filter::{AlertFilter, NotificationFilter};
pub use notification::{Notification, NotificationPriority, NotificationStatus};
