// Notification endpoints
//
// `/api/notifications` is user-scoped: the bearer token decides whose
// inbox is returned.

use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::{MarkAllReadResponse, NotificationQuery, NotificationResponse, UnreadCount};

const NOTIFICATIONS: &str = "notifications";

impl ApiClient {
    /// `GET /api/notifications?status=&priority=&unread=&search=`
    pub async fn list_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationResponse>, Error> {
        self.get_with_params(NOTIFICATIONS, &query.to_params()).await
    }

    /// `PUT /api/notifications/{id}/read`
    pub async fn mark_notification_read(&self, id: &str) -> Result<(), Error> {
        debug!(notification_id = id, "marking notification read");
        let id = url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>();
        self.put_no_response(&format!("{NOTIFICATIONS}/{id}/read"))
            .await
    }

    /// `PUT /api/notifications/read-all`
    pub async fn mark_all_notifications_read(&self) -> Result<MarkAllReadResponse, Error> {
        self.put_empty(&format!("{NOTIFICATIONS}/read-all")).await
    }

    /// `DELETE /api/notifications/{id}`
    pub async fn delete_notification(&self, id: &str) -> Result<(), Error> {
        let id = url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>();
        self.delete(&format!("{NOTIFICATIONS}/{id}")).await
    }

    /// `GET /api/notifications/unread-count`
    pub async fn unread_notification_count(&self) -> Result<u64, Error> {
        let count: UnreadCount = self.get(&format!("{NOTIFICATIONS}/unread-count")).await?;
        Ok(count.count)
    }
}
