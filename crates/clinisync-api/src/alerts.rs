// Monitoring alert endpoints
//
// All paths live under `/api/monitoring/alerts`. Lifecycle actions
// (acknowledge / resolve / suppress) return the updated record so the
// caller can apply it to its store without a second fetch.

use bytes::Bytes;
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Error;
use crate::types::{
    AcknowledgeRequest, AlertQuery, AlertResponse, AlertStatsResponse, AlertUpdateRequest,
    ExportFormat, ImportSummary, NewAlertRequest, ResolveRequest, SuppressRequest,
    TestAlertRequest,
};

const ALERTS: &str = "monitoring/alerts";

fn alert_path(id: &str, suffix: Option<&str>) -> String {
    let id = url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>();
    match suffix {
        Some(s) => format!("{ALERTS}/{id}/{s}"),
        None => format!("{ALERTS}/{id}"),
    }
}

impl ApiClient {
    /// List alerts matching the given filter.
    ///
    /// `GET /api/monitoring/alerts?category=&severity=&status=&source=&from=&to=&search=`
    pub async fn list_alerts(&self, query: &AlertQuery) -> Result<Vec<AlertResponse>, Error> {
        let params = query.to_params();
        debug!(?params, "listing alerts");
        self.get_with_params(ALERTS, &params).await
    }

    /// `GET /api/monitoring/alerts/{id}`
    pub async fn get_alert(&self, id: &str) -> Result<AlertResponse, Error> {
        self.get(&alert_path(id, None)).await
    }

    /// `POST /api/monitoring/alerts`
    pub async fn create_alert(&self, body: &NewAlertRequest) -> Result<AlertResponse, Error> {
        debug!(title = %body.title, "creating alert");
        self.post(ALERTS, body).await
    }

    /// `PUT /api/monitoring/alerts/{id}`
    pub async fn update_alert(
        &self,
        id: &str,
        body: &AlertUpdateRequest,
    ) -> Result<AlertResponse, Error> {
        self.put(&alert_path(id, None), body).await
    }

    /// `DELETE /api/monitoring/alerts/{id}`
    pub async fn delete_alert(&self, id: &str) -> Result<(), Error> {
        debug!(alert_id = id, "deleting alert");
        self.delete(&alert_path(id, None)).await
    }

    /// `POST /api/monitoring/alerts/{id}/acknowledge`
    pub async fn acknowledge_alert(
        &self,
        id: &str,
        note: Option<String>,
    ) -> Result<AlertResponse, Error> {
        self.post(
            &alert_path(id, Some("acknowledge")),
            &AcknowledgeRequest { note },
        )
        .await
    }

    /// `POST /api/monitoring/alerts/{id}/resolve`
    pub async fn resolve_alert(
        &self,
        id: &str,
        resolution: Option<String>,
    ) -> Result<AlertResponse, Error> {
        self.post(
            &alert_path(id, Some("resolve")),
            &ResolveRequest { resolution },
        )
        .await
    }

    /// `POST /api/monitoring/alerts/{id}/suppress`
    pub async fn suppress_alert(
        &self,
        id: &str,
        body: &SuppressRequest,
    ) -> Result<AlertResponse, Error> {
        self.post(&alert_path(id, Some("suppress")), body).await
    }

    /// Ask the back end to raise a synthetic alert through its normal
    /// delivery pipeline.
    ///
    /// `POST /api/monitoring/alerts/test`
    pub async fn test_alert(&self, body: &TestAlertRequest) -> Result<AlertResponse, Error> {
        self.post(&format!("{ALERTS}/test"), body).await
    }

    /// `POST /api/monitoring/alerts/{id}/duplicate`
    pub async fn duplicate_alert(&self, id: &str) -> Result<AlertResponse, Error> {
        self.post(&alert_path(id, Some("duplicate")), &serde_json::json!({}))
            .await
    }

    /// `POST /api/monitoring/alerts/import`
    pub async fn import_alerts(&self, alerts: &[NewAlertRequest]) -> Result<ImportSummary, Error> {
        debug!(count = alerts.len(), "importing alerts");
        self.post(&format!("{ALERTS}/import"), &alerts).await
    }

    /// Download the filtered alert list rendered by the back end.
    ///
    /// `GET /api/monitoring/alerts/export?format=json|csv&...`
    pub async fn export_alerts(
        &self,
        query: &AlertQuery,
        format: ExportFormat,
    ) -> Result<Bytes, Error> {
        let mut params = query.to_params();
        params.push(("format", format.as_str().to_owned()));
        self.get_bytes(&format!("{ALERTS}/export"), &params).await
    }

    /// `GET /api/monitoring/alerts/stats`
    pub async fn alert_stats(&self) -> Result<AlertStatsResponse, Error> {
        self.get(&format!("{ALERTS}/stats")).await
    }
}
