// ── Alert sync engine ──
//
// Owns the connection to one back end: the REST client, the query cache,
// the store, the command processor, and a single background scheduler
// that is in exactly one of three modes (realtime socket, polling, idle).

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::Utc;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use clinisync_api::realtime::{self, ChannelState, RealtimeEvent, RealtimeHandle};
use clinisync_api::transport::{TlsMode, TransportConfig};
use clinisync_api::types::{AlertStatsResponse, NewAlertRequest};
use clinisync_api::{ApiClient, Credentials};

use crate::cache::{Freshness, NOTIFICATIONS_RESOURCE, QueryCache, QueryKey};
use crate::command::{Command, CommandEnvelope, CommandResult};
use crate::config::{AuthCredentials, SyncConfig, SyncMode, SyncSettings, TlsVerification};
use crate::error::CoreError;
use crate::model::{Alert, AlertFilter, AlertId, Notification, NotificationFilter};
use crate::notice::Notice;
use crate::store::{ApplyOutcome, DataStore};
use crate::stream::EntityStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const NOTICE_CHANNEL_SIZE: usize = 64;
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_secs(30);

// ── ConnectionState ──────────────────────────────────────────────

/// Whether the engine is attached to a back end.
///
/// Realtime channel health is tracked separately, see
/// [`AlertSync::channel_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

// ── AlertSync ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SyncInner>`. `connect()` loads the initial
/// data and starts the background tasks; `disconnect()` stops them and
/// can be followed by another `connect()`.
#[derive(Clone)]
pub struct AlertSync {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    config: SyncConfig,
    store: Arc<DataStore>,
    alert_cache: QueryCache<Vec<Alert>>,
    notification_cache: QueryCache<Vec<Notification>>,
    /// Key of the alert list currently held by the store.
    applied_alert_key: std::sync::Mutex<Option<QueryKey>>,
    filters: watch::Sender<AlertFilter>,
    notification_filter: watch::Sender<NotificationFilter>,
    settings: watch::Sender<SyncSettings>,
    connection_state: watch::Sender<ConnectionState>,
    sync_mode: watch::Sender<SyncMode>,
    channel_state: watch::Sender<ChannelState>,
    notice_tx: broadcast::Sender<Notice>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    command_task: Mutex<Option<JoinHandle<mpsc::Receiver<CommandEnvelope>>>>,
    cancel: CancellationToken,
    /// Child of `cancel`, replaced on every `connect()`.
    session: Mutex<Option<CancellationToken>>,
    client: ArcSwapOption<ApiClient>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertSync {
    /// Create a new engine from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to load data and start background tasks.
    pub fn new(config: SyncConfig) -> Self {
        let store = Arc::new(DataStore::new(config.max_alerts));
        let (filters, _) = watch::channel(AlertFilter::default());
        let (notification_filter, _) = watch::channel(NotificationFilter::default());
        let (settings, _) = watch::channel(config.settings.clone());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (sync_mode, _) = watch::channel(SyncMode::Idle);
        let (channel_state, _) = watch::channel(ChannelState::Disconnected);
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SyncInner {
                config,
                store,
                alert_cache: QueryCache::new(),
                notification_cache: QueryCache::new(),
                applied_alert_key: std::sync::Mutex::new(None),
                filters,
                notification_filter,
                settings,
                connection_state,
                sync_mode,
                channel_state,
                notice_tx,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                command_task: Mutex::new(None),
                cancel: CancellationToken::new(),
                session: Mutex::new(None),
                client: ArcSwapOption::empty(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the back end.
    ///
    /// Builds the REST client, loads alerts and notifications, then spawns
    /// the command processor and the scheduler. A failed initial load
    /// leaves the engine in [`ConnectionState::Failed`].
    pub async fn connect(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        if *inner.connection_state.borrow() == ConnectionState::Connected {
            return Ok(());
        }
        inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        let client = match build_client(&inner.config) {
            Ok(client) => client,
            Err(e) => {
                inner.connection_state.send_replace(ConnectionState::Failed);
                return Err(e);
            }
        };
        inner.client.store(Some(Arc::new(client)));

        // Initial data load
        if let Err(e) = self.load(false).await {
            inner.client.store(None);
            inner.connection_state.send_replace(ConnectionState::Failed);
            return Err(e);
        }

        let session = inner.cancel.child_token();
        *inner.session.lock().await = Some(session.clone());

        let command_rx = inner.command_rx.lock().await.take();
        if let Some(rx) = command_rx {
            let task = tokio::spawn(command_processor_task(self.clone(), rx, session.clone()));
            *inner.command_task.lock().await = Some(task);
        }

        inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(scheduler_task(self.clone(), session)));

        inner
            .connection_state
            .send_replace(ConnectionState::Connected);
        info!(url = %inner.config.api_url, "connected to back end");
        Ok(())
    }

    /// Stop background tasks and drop the client. The store keeps its
    /// last contents.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        if let Some(session) = inner.session.lock().await.take() {
            session.cancel();
        }

        let mut handles = inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        // Hand the receiver back so a later connect() can respawn the processor.
        let command_task = inner.command_task.lock().await.take();
        if let Some(task) = command_task {
            match task.await {
                Ok(rx) => *inner.command_rx.lock().await = Some(rx),
                Err(e) => warn!(error = %e, "command processor ended abnormally"),
            }
        }

        inner.client.store(None);
        inner.channel_state.send_replace(ChannelState::Disconnected);
        inner.sync_mode.send_replace(SyncMode::Idle);
        inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Refetch alerts and notifications, bypassing the cache.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.load(true).await
    }

    /// Fetch the alert list for the current filter and merge it into the
    /// store. `force` skips the cache's freshness window.
    pub async fn refresh_alerts(&self, force: bool) -> Result<(), CoreError> {
        let client = self.client()?;
        let filter = self.inner.filters.borrow().clone();
        let key = filter.query_key();
        let query = filter.to_query();
        let ticket = self.inner.store.begin_alert_fetch();

        let (alerts, freshness) = self
            .inner
            .alert_cache
            .fetch(&key, self.stale_time(force), move || async move {
                let raw = client.list_alerts(&query).await?;
                Ok::<_, CoreError>(raw.into_iter().map(Alert::from).collect::<Vec<_>>())
            })
            .await?;

        // The filter moved on while the request was in flight.
        if self.inner.filters.borrow().query_key() != key {
            debug!(key = ?key, "discarding alert list for superseded filter");
            return Ok(());
        }

        let mut applied = self
            .inner
            .applied_alert_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if freshness == Freshness::Cached && applied.as_ref() == Some(&key) {
            return Ok(());
        }
        let outcome = self
            .inner
            .store
            .apply_alert_snapshot(alerts.iter().cloned(), ticket);
        *applied = Some(key);
        debug!(
            alerts = self.inner.store.alert_count(),
            pruned = outcome.pruned,
            ?freshness,
            "alert list synced"
        );
        Ok(())
    }

    /// Fetch the notification inbox for the current notification filter.
    pub async fn refresh_notifications(&self, force: bool) -> Result<(), CoreError> {
        let client = self.client()?;
        let filter = self.inner.notification_filter.borrow().clone();
        let key = filter.query_key();
        let query = filter.to_query();

        let (notifications, _) = self
            .inner
            .notification_cache
            .fetch(&key, self.stale_time(force), move || async move {
                let raw = client.list_notifications(&query).await?;
                Ok::<_, CoreError>(raw.into_iter().map(Notification::from).collect::<Vec<_>>())
            })
            .await?;

        if self.inner.notification_filter.borrow().query_key() == key {
            self.inner
                .store
                .apply_notification_snapshot(notifications.iter().cloned().collect());
        }
        Ok(())
    }

    async fn load(&self, force: bool) -> Result<(), CoreError> {
        tokio::try_join!(
            self.refresh_alerts(force),
            self.refresh_notifications(force)
        )?;
        Ok(())
    }

    fn stale_time(&self, force: bool) -> Duration {
        if force {
            Duration::ZERO
        } else {
            self.inner.config.stale_time
        }
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command against the back end.
    ///
    /// Sends the command through the internal channel to the command
    /// processor task and awaits the result. A [`Notice`] is broadcast
    /// for every command, whatever the outcome.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        if *self.inner.connection_state.borrow() != ConnectionState::Connected {
            return Err(CoreError::NotConnected);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();

        self.inner
            .command_tx
            .send(CommandEnvelope {
                command: cmd,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::NotConnected)?;

        rx.await.map_err(|_| CoreError::NotConnected)?
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, disconnect.
    ///
    /// Turns off realtime and auto refresh since only a single
    /// request-response cycle is needed.
    pub async fn oneshot<F, Fut, T>(config: SyncConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(AlertSync) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.settings.realtime_enabled = false;
        cfg.settings.auto_refresh = false;

        let sync = AlertSync::new(cfg);
        sync.connect().await?;
        let result = f(sync.clone()).await;
        sync.disconnect().await;
        result
    }

    // ── Direct reads ─────────────────────────────────────────────

    /// Fetch one alert from the back end and merge it into the store.
    pub async fn get_alert(&self, id: &AlertId) -> Result<Arc<Alert>, CoreError> {
        let client = self.client()?;
        let alert = Alert::from(client.get_alert(id.as_str()).await.map_err(|e| {
            match CoreError::from(e) {
                CoreError::NotFound { .. } => CoreError::AlertNotFound { id: id.to_string() },
                other => other,
            }
        })?);
        let alert = Arc::new(alert);
        self.inner.store.apply_alert_update((*alert).clone());
        Ok(alert)
    }

    pub async fn alert_stats(&self) -> Result<AlertStatsResponse, CoreError> {
        Ok(self.client()?.alert_stats().await?)
    }

    /// Unread count as reported by the back end.
    pub async fn unread_notification_count(&self) -> Result<u64, CoreError> {
        Ok(self.client()?.unread_notification_count().await?)
    }

    // ── Filters and settings ─────────────────────────────────────

    /// Replace the alert filter. When connected, the new list is fetched
    /// and the realtime subscription is updated.
    pub async fn set_filters(&self, filter: AlertFilter) -> Result<(), CoreError> {
        let changed = self.inner.filters.send_if_modified(|current| {
            if *current == filter {
                false
            } else {
                *current = filter;
                true
            }
        });
        if changed && *self.inner.connection_state.borrow() == ConnectionState::Connected {
            self.refresh_alerts(false).await?;
        }
        Ok(())
    }

    pub fn filters(&self) -> AlertFilter {
        self.inner.filters.borrow().clone()
    }

    pub async fn set_notification_filter(
        &self,
        filter: NotificationFilter,
    ) -> Result<(), CoreError> {
        self.inner.notification_filter.send_replace(filter);
        if *self.inner.connection_state.borrow() == ConnectionState::Connected {
            self.refresh_notifications(false).await?;
        }
        Ok(())
    }

    pub fn set_realtime(&self, enabled: bool) {
        self.update_settings(|s| s.realtime_enabled = enabled);
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.update_settings(|s| s.auto_refresh = enabled);
    }

    pub fn set_refresh_interval(&self, interval: Duration) {
        self.update_settings(|s| s.refresh_interval = interval);
    }

    pub fn settings(&self) -> SyncSettings {
        self.inner.settings.borrow().clone()
    }

    fn update_settings(&self, f: impl FnOnce(&mut SyncSettings)) {
        self.inner.settings.send_if_modified(|current| {
            let before = current.clone();
            f(current);
            *current != before
        });
    }

    // ── State observation ────────────────────────────────────────

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Which background source is active.
    pub fn sync_mode(&self) -> watch::Receiver<SyncMode> {
        self.inner.sync_mode.subscribe()
    }

    /// Realtime channel state. `Disconnected` outside socket mode.
    pub fn channel_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.channel_state.subscribe()
    }

    /// Outcome notices, one per executed command.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notice_tx.subscribe()
    }

    /// How many times `resource` has been invalidated.
    pub fn invalidations(&self, resource: &str) -> u64 {
        self.inner.alert_cache.invalidations(resource)
            + self.inner.notification_cache.invalidations(resource)
    }

    // ── Data access (delegate to DataStore) ──────────────────────

    pub fn alerts(&self) -> EntityStream<Alert> {
        self.inner.store.subscribe_alerts()
    }

    pub fn alerts_snapshot(&self) -> Arc<Vec<Arc<Alert>>> {
        self.inner.store.alerts_snapshot()
    }

    /// The store's alerts that pass the active filter.
    pub fn filtered_alerts(&self) -> Vec<Arc<Alert>> {
        self.inner
            .filters
            .borrow()
            .apply(self.inner.store.alerts_snapshot().iter())
    }

    pub fn alert(&self, id: &AlertId) -> Option<Arc<Alert>> {
        self.inner.store.alert_by_id(id)
    }

    pub fn notifications(&self) -> EntityStream<Notification> {
        self.inner.store.subscribe_notifications()
    }

    pub fn notifications_snapshot(&self) -> Arc<Vec<Arc<Notification>>> {
        self.inner.store.notifications_snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.store.unread_count()
    }

    // ── Internals ────────────────────────────────────────────────

    fn client(&self) -> Result<Arc<ApiClient>, CoreError> {
        self.inner.client.load_full().ok_or(CoreError::NotConnected)
    }

    /// Merge a server-confirmed alert, honouring the active filter.
    fn apply_alert(&self, alert: Alert) -> ApplyOutcome {
        let store = &self.inner.store;
        if self.inner.filters.borrow().matches(&alert) {
            return store.apply_alert_update(alert);
        }
        // No longer visible under this filter; drop it unless we hold newer.
        match store.alert_by_id(&alert.id) {
            Some(existing) if existing.revision() > alert.revision() => ApplyOutcome::Stale,
            _ => {
                store.evict_alert(&alert.id);
                ApplyOutcome::Replaced
            }
        }
    }

    fn apply_realtime_event(&self, event: &RealtimeEvent) {
        self.inner.store.mark_realtime_event();
        match event {
            RealtimeEvent::AlertUpdate { alert } => {
                let alert = Alert::from(alert.clone());
                let id = alert.id.clone();
                let outcome = self.apply_alert(alert);
                if outcome == ApplyOutcome::Stale {
                    debug!(alert_id = %id, "dropped stale realtime update");
                }
            }
            RealtimeEvent::AlertDeleted { alert_id } => {
                let id = AlertId::from(alert_id.as_str());
                if !self.inner.store.apply_alert_deleted(&id) {
                    debug!(alert_id = %id, "realtime delete for unknown alert");
                }
            }
        }
    }

    /// Invalidate, re-sync, and announce the outcome of one command.
    async fn finish_command(
        &self,
        resource: &'static str,
        action: &'static str,
        success: &'static str,
        result: &Result<CommandResult, CoreError>,
    ) {
        let notice = match result {
            Ok(output) => {
                if resource == NOTIFICATIONS_RESOURCE {
                    self.inner.notification_cache.invalidate(resource);
                    if let Err(e) = self.refresh_notifications(false).await {
                        warn!(error = %e, "notification re-sync after command failed");
                    }
                } else {
                    self.inner.alert_cache.invalidate(resource);
                    if let Err(e) = self.refresh_alerts(false).await {
                        warn!(error = %e, "alert re-sync after command failed");
                    }
                }
                Notice::success(action, success_text(success, output))
            }
            Err(e) => {
                warn!(action, error = %e, "command failed");
                Notice::failure(action, e)
            }
        };
        let _ = self.inner.notice_tx.send(notice);
    }
}

fn success_text(base: &str, output: &CommandResult) -> String {
    match output {
        CommandResult::Imported(summary) if summary.skipped > 0 => format!(
            "{base}: {} imported, {} skipped",
            summary.imported, summary.skipped
        ),
        CommandResult::Imported(summary) => format!("{base}: {} imported", summary.imported),
        CommandResult::Updated(n) => format!("{base} ({n})"),
        CommandResult::Alert(alert) => format!("{base}: {}", alert.title),
        CommandResult::Ok | CommandResult::Exported(_) => base.to_owned(),
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Why a scheduler mode ended.
enum ModeExit {
    Cancelled,
    SettingsChanged,
    /// The realtime channel stopped retrying.
    GaveUp,
}

/// Run exactly one sync mode at a time, switching when settings change
/// or the realtime channel gives up.
async fn scheduler_task(sync: AlertSync, cancel: CancellationToken) {
    let mut settings_rx = sync.inner.settings.subscribe();
    let mut gave_up = false;

    loop {
        let settings = settings_rx.borrow_and_update().clone();
        let socket_unavailable = gave_up || sync.inner.config.ws_url.is_none();
        let mode = settings.mode(socket_unavailable);
        sync.inner.sync_mode.send_replace(mode);
        info!(%mode, "sync mode");

        let exit = match mode {
            SyncMode::Socket => run_socket(&sync, &cancel, &mut settings_rx).await,
            SyncMode::Polling => {
                run_polling(&sync, &cancel, &mut settings_rx, poll_interval(&settings)).await
            }
            SyncMode::Idle => run_idle(&cancel, &mut settings_rx).await,
        };

        match exit {
            ModeExit::Cancelled => break,
            ModeExit::SettingsChanged => gave_up = false,
            ModeExit::GaveUp => gave_up = true,
        }
    }

    sync.inner.sync_mode.send_replace(SyncMode::Idle);
}

fn poll_interval(settings: &SyncSettings) -> Duration {
    if settings.refresh_interval.is_zero() {
        FALLBACK_POLL_INTERVAL
    } else {
        settings.refresh_interval.max(MIN_POLL_INTERVAL)
    }
}

/// Bridge the realtime channel into the store until told to stop.
async fn run_socket(
    sync: &AlertSync,
    cancel: &CancellationToken,
    settings_rx: &mut watch::Receiver<SyncSettings>,
) -> ModeExit {
    let config = &sync.inner.config;
    let Some(ws_base) = config.ws_url.as_ref() else {
        return ModeExit::GaveUp;
    };
    let url = match realtime::alerts_url(ws_base.as_str()) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "invalid realtime URL, falling back to polling");
            return ModeExit::GaveUp;
        }
    };

    let mut filters_rx = sync.inner.filters.subscribe();
    let handle = RealtimeHandle::connect(
        url,
        &credentials(&config.auth),
        filters_rx.borrow_and_update().to_query(),
        config.reconnect.clone(),
        cancel.child_token(),
    );
    let mut events = handle.subscribe();
    let mut state_rx = handle.state();

    let exit = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break ModeExit::Cancelled,
            changed = settings_rx.changed() => {
                break if changed.is_ok() { ModeExit::SettingsChanged } else { ModeExit::Cancelled };
            }
            Ok(()) = filters_rx.changed() => {
                handle.update_filters(filters_rx.borrow_and_update().to_query());
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break ModeExit::GaveUp;
                }
                let state = state_rx.borrow_and_update().clone();
                sync.inner.channel_state.send_replace(state.clone());
                match state {
                    // Catch up on anything missed while the socket was down.
                    ChannelState::Connected => {
                        if let Err(e) = sync.refresh_alerts(true).await {
                            warn!(error = %e, "reconcile after realtime connect failed");
                        }
                    }
                    ChannelState::GaveUp { attempts } => {
                        warn!(attempts, "realtime channel gave up, falling back to polling");
                        break ModeExit::GaveUp;
                    }
                    _ => {}
                }
            }
            event = events.recv() => match event {
                Ok(event) => sync.apply_realtime_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime consumer lagged, refetching");
                    if let Err(e) = sync.refresh_alerts(true).await {
                        warn!(error = %e, "refetch after lag failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break ModeExit::GaveUp,
            },
        }
    };

    handle.shutdown();
    if !matches!(exit, ModeExit::GaveUp) {
        sync.inner
            .channel_state
            .send_replace(ChannelState::Disconnected);
    }
    exit
}

/// Refetch on a fixed interval. The first poll lands one interval after
/// entering this mode.
async fn run_polling(
    sync: &AlertSync,
    cancel: &CancellationToken,
    settings_rx: &mut watch::Receiver<SyncSettings>,
    period: Duration,
) -> ModeExit {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return ModeExit::Cancelled,
            changed = settings_rx.changed() => {
                return if changed.is_ok() { ModeExit::SettingsChanged } else { ModeExit::Cancelled };
            }
            _ = interval.tick() => {
                debug!(interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "polling");
                if let Err(e) = sync.load(true).await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

async fn run_idle(
    cancel: &CancellationToken,
    settings_rx: &mut watch::Receiver<SyncSettings>,
) -> ModeExit {
    tokio::select! {
        biased;
        () = cancel.cancelled() => ModeExit::Cancelled,
        changed = settings_rx.changed() => {
            if changed.is_ok() { ModeExit::SettingsChanged } else { ModeExit::Cancelled }
        }
    }
}

/// Process commands from the mpsc channel one at a time.
///
/// Returns the receiver on shutdown so the engine can reconnect.
async fn command_processor_task(
    sync: AlertSync,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) -> mpsc::Receiver<CommandEnvelope> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let command = envelope.command;
                let resource = command.resource();
                let action = command.action();
                let success = command.success_message();

                let result = route_command(&sync, command).await;
                sync.finish_command(resource, action, success, &result).await;
                let _ = envelope.response_tx.send(result);
            }
        }
    }
    rx
}

// ── Command routing ──────────────────────────────────────────────

/// Route a command to its data service call.
///
/// Lifecycle commands on alerts the store knows are checked against the
/// transition table first; unknown alerts are left to the server.
async fn route_command(sync: &AlertSync, cmd: Command) -> Result<CommandResult, CoreError> {
    let client = sync.client()?;
    let store = &sync.inner.store;

    if let Some((id, to)) = cmd.target_status() {
        if let Some(current) = store.alert_by_id(id) {
            if !current.status.can_transition_to(to) {
                return Err(CoreError::InvalidTransition {
                    id: id.clone(),
                    from: current.status,
                    to,
                });
            }
        }
    }

    let not_found = |id: &AlertId| {
        let id = id.to_string();
        move |e: clinisync_api::Error| match CoreError::from(e) {
            CoreError::NotFound { .. } => CoreError::AlertNotFound { id },
            other => other,
        }
    };

    match cmd {
        // ── Alert lifecycle ──────────────────────────────────────

        Command::AcknowledgeAlert { id, note } => {
            let raw = client
                .acknowledge_alert(id.as_str(), note)
                .await
                .map_err(not_found(&id))?;
            Ok(confirmed(sync, raw.into()))
        }

        Command::ResolveAlert { id, resolution } => {
            let raw = client
                .resolve_alert(id.as_str(), resolution)
                .await
                .map_err(not_found(&id))?;
            Ok(confirmed(sync, raw.into()))
        }

        Command::SuppressAlert { id, options } => {
            let raw = client
                .suppress_alert(id.as_str(), &options.into())
                .await
                .map_err(not_found(&id))?;
            Ok(confirmed(sync, raw.into()))
        }

        // ── Alert CRUD ───────────────────────────────────────────

        Command::CreateAlert(req) => {
            let raw = client.create_alert(&req.into()).await?;
            Ok(confirmed(sync, raw.into()))
        }

        Command::UpdateAlert { id, update } => {
            let raw = client
                .update_alert(id.as_str(), &update.into())
                .await
                .map_err(not_found(&id))?;
            Ok(confirmed(sync, raw.into()))
        }

        Command::DeleteAlert { id } => {
            client
                .delete_alert(id.as_str())
                .await
                .map_err(not_found(&id))?;
            store.apply_alert_deleted(&id);
            Ok(CommandResult::Ok)
        }

        Command::DuplicateAlert { id } => {
            let raw = client
                .duplicate_alert(id.as_str())
                .await
                .map_err(not_found(&id))?;
            Ok(confirmed(sync, raw.into()))
        }

        Command::TestAlert(req) => {
            let raw = client.test_alert(&req.into()).await?;
            Ok(confirmed(sync, raw.into()))
        }

        // ── Bulk ─────────────────────────────────────────────────

        Command::ImportAlerts { alerts } => {
            let bodies: Vec<NewAlertRequest> = alerts.into_iter().map(Into::into).collect();
            let summary = client.import_alerts(&bodies).await?;
            Ok(CommandResult::Imported(summary))
        }

        Command::ExportAlerts { filter, format } => {
            let bytes = client.export_alerts(&filter.to_query(), format).await?;
            Ok(CommandResult::Exported(bytes))
        }

        // ── Notifications ────────────────────────────────────────

        Command::MarkNotificationRead { id } => {
            client.mark_notification_read(&id).await?;
            store.mark_notification_read(&id, Utc::now());
            Ok(CommandResult::Ok)
        }

        Command::MarkAllNotificationsRead => {
            let response = client.mark_all_notifications_read().await?;
            Ok(CommandResult::Updated(response.updated))
        }

        Command::DeleteNotification { id } => {
            client.delete_notification(&id).await?;
            store.remove_notification(&id);
            Ok(CommandResult::Ok)
        }
    }
}

/// Store the server's copy of a mutated alert and hand it back.
fn confirmed(sync: &AlertSync, alert: Alert) -> CommandResult {
    let alert = Arc::new(alert);
    sync.apply_alert((*alert).clone());
    CommandResult::Alert(alert)
}

// ── Helpers ──────────────────────────────────────────────────────

fn build_client(config: &SyncConfig) -> Result<ApiClient, CoreError> {
    Ok(ApiClient::new(
        config.api_url.as_str(),
        &credentials(&config.auth),
        &build_transport(config),
    )?)
}

fn build_transport(config: &SyncConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

fn credentials(auth: &AuthCredentials) -> Credentials {
    match auth {
        AuthCredentials::Token(token) => Credentials::Bearer {
            token: token.clone(),
        },
        AuthCredentials::Anonymous => Credentials::Anonymous,
    }
}
