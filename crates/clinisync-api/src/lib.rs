// clinisync-api: Async Rust client for the clinic back end (REST + realtime alerts)

pub mod alerts;
pub mod auth;
pub mod client;
pub mod error;
pub mod notifications;
pub mod realtime;
pub mod transport;
pub mod types;

pub use auth::Credentials;
pub use client::ApiClient;
pub use error::{Error, ErrorKind};
pub use realtime::{ChannelState, RealtimeEvent, RealtimeHandle, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    AlertQuery, AlertResponse, AlertStatsResponse, AlertUpdateRequest, ExportFormat,
    ImportSummary, NewAlertRequest, NotificationQuery, NotificationResponse, SuppressRequest,
    TestAlertRequest,
};
