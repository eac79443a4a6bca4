// clinisync-core: Reactive alert and notification sync between clinisync-api and consumers (CLI).

pub mod cache;
pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod notice;
pub mod store;
pub mod stream;
pub mod sync;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{ALERTS_RESOURCE, NOTIFICATIONS_RESOURCE, QueryCache, QueryKey};
pub use command::requests::*;
pub use command::{Command, CommandResult};
pub use config::{AuthCredentials, SyncConfig, SyncMode, SyncSettings, TlsVerification};
pub use error::{CoreError, ErrorKind};
pub use notice::Notice;
pub use store::{ApplyOutcome, DataStore};
pub use stream::EntityStream;
pub use sync::{AlertSync, ConnectionState};

// Wire types that appear in this crate's public API.
pub use clinisync_api::types::AlertStatsResponse;
pub use clinisync_api::{ChannelState, ExportFormat, ImportSummary, ReconnectConfig};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Alert, AlertCategory, AlertFilter, AlertId, AlertSeverity, AlertStatus, Notification,
    NotificationFilter, NotificationPriority, NotificationStatus, Revision,
};
