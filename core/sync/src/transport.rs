//! Transport contract: the single `POST /sync` exchange with the server.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use confab_common::{DeviceId, Error, Operation, Result, UserId};
use confab_store::{ChangeRecord, SyncConflict};

/// One local change as sent on the wire.
///
/// Status and failure bookkeeping stay local; only the mutation itself
/// travels. Entity kind is serialized as its table name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChange {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: String,
    pub timestamp: i64,
}

impl From<&ChangeRecord> for WireChange {
    fn from(record: &ChangeRecord) -> Self {
        Self {
            id: record.id.clone(),
            entity_type: record.entity_kind.as_str().to_string(),
            entity_id: record.entity_id.clone(),
            operation: record.operation,
            payload: record.payload.clone(),
            timestamp: record.timestamp,
        }
    }
}

/// Request body for the sync RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: UserId,
    pub device_id: DeviceId,
    /// Everything at or before this timestamp has already been exchanged.
    pub cursor: i64,
    pub changes: Vec<WireChange>,
}

/// Acknowledgement of one uploaded change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckedChange {
    pub change_id: String,
    /// Canonical id the server assigned to a locally created entity.
    #[serde(default)]
    pub server_entity_id: Option<String>,
}

/// A remote mutation this client has not yet seen.
///
/// `entity_type` stays a string: the server may know kinds this build
/// does not, and unknown kinds are skipped rather than failing the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerChange {
    pub entity_type: String,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: String,
    pub timestamp: i64,
}

/// Response body for the sync RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub synced_changes: Vec<AckedChange>,
    #[serde(default)]
    pub conflicts: Vec<SyncConflict>,
    #[serde(default)]
    pub server_changes: Vec<ServerChange>,
    pub new_timestamp: i64,
    #[serde(default)]
    pub requires_full_sync: bool,
}

impl SyncResponse {
    /// Successful exchange with an empty body. `new_timestamp` echoes the
    /// client's own cursor, so applying it is a no-op advance; only a
    /// server-stamped timestamp may move the cursor forward.
    fn empty_at(cursor: i64) -> Self {
        Self {
            success: true,
            message: None,
            synced_changes: Vec::new(),
            conflicts: Vec::new(),
            server_changes: Vec::new(),
            new_timestamp: cursor,
            requires_full_sync: false,
        }
    }
}

/// Transport over which the sync exchange happens.
///
/// Implementations must not retry internally; the engine treats any
/// error as "nothing was applied" and leaves retry policy to callers.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn exchange(
        &self,
        credential: &str,
        request: &SyncRequest,
        timeout: Duration,
    ) -> Result<SyncResponse>;
}

/// HTTP implementation of the sync transport.
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Create a transport for the given server base URL.
    ///
    /// # Errors
    /// - Base URL cannot be joined with the sync path
    pub fn new(base_url: Url) -> Result<Self> {
        let endpoint = base_url
            .join("sync")
            .map_err(|e| Error::InvalidInput(format!("invalid sync URL: {}", e)))?;
        Ok(Self {
            http: Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn exchange(
        &self,
        credential: &str,
        request: &SyncRequest,
        timeout: Duration,
    ) -> Result<SyncResponse> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(credential)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Transport(format!("sync request timed out: {}", e))
                } else {
                    Error::Transport(format!("sync request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::ServerRejected {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown")
                        .to_string()
                } else {
                    message
                },
            });
        }
        if status == StatusCode::NO_CONTENT {
            // An empty success body means "nothing new"; the cursor must
            // not move past what the server actually confirmed.
            return Ok(SyncResponse::empty_at(request.cursor));
        }

        response
            .json::<SyncResponse>()
            .await
            .map_err(|e| Error::Serialization(format!("malformed sync response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_common::EntityKind;

    #[test]
    fn test_request_wire_shape() {
        let record = ChangeRecord::new(
            UserId::new("alice").unwrap(),
            DeviceId::new("phone").unwrap(),
            EntityKind::TimeSlot,
            "ts-1",
            Operation::Create,
            r#"{"start":1}"#,
        );
        let request = SyncRequest {
            user_id: record.user_id.clone(),
            device_id: record.device_id.clone(),
            cursor: 1234,
            changes: vec![WireChange::from(&record)],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["deviceId"], "phone");
        assert_eq!(json["cursor"], 1234);
        assert_eq!(json["changes"][0]["entityType"], "timeSlots");
        assert_eq!(json["changes"][0]["operation"], "CREATE");
        // Status never goes on the wire.
        assert!(json["changes"][0].get("status").is_none());
    }

    #[test]
    fn test_response_wire_shape() {
        let json = r#"{
            "success": true,
            "syncedChanges": [
                {"changeId": "ch-1", "serverEntityId": "srv-9"},
                {"changeId": "ch-2"}
            ],
            "conflicts": [{
                "id": "c-1",
                "entityType": "events",
                "entityId": "evt-1",
                "localVersion": "l",
                "remoteVersion": "r",
                "timestamp": 100,
                "serverTimestamp": 200
            }],
            "serverChanges": [{
                "entityType": "votes",
                "entityId": "v-1",
                "operation": "UPDATE",
                "payload": "{\"score\":2}",
                "timestamp": 150
            }],
            "newTimestamp": 999,
            "requiresFullSync": false
        }"#;

        let response: SyncResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.synced_changes.len(), 2);
        assert_eq!(
            response.synced_changes[0].server_entity_id.as_deref(),
            Some("srv-9")
        );
        assert!(response.synced_changes[1].server_entity_id.is_none());
        assert_eq!(response.conflicts[0].server_timestamp, 200);
        assert_eq!(response.server_changes[0].operation, Operation::Update);
        assert_eq!(response.new_timestamp, 999);
        assert!(!response.requires_full_sync);
    }

    #[test]
    fn test_response_defaults_for_sparse_body() {
        let response: SyncResponse =
            serde_json::from_str(r#"{"success": true, "newTimestamp": 5}"#).unwrap();
        assert!(response.synced_changes.is_empty());
        assert!(response.conflicts.is_empty());
        assert!(response.server_changes.is_empty());
        assert!(!response.requires_full_sync);
    }

    #[test]
    fn test_empty_body_echoes_request_cursor() {
        // A 204 carries no server timestamp; synthesizing one from the
        // local clock could jump the cursor past unseen server changes.
        let response = SyncResponse::empty_at(1234);
        assert!(response.success);
        assert_eq!(response.new_timestamp, 1234);
        assert!(response.synced_changes.is_empty());
        assert!(response.server_changes.is_empty());
        assert!(!response.requires_full_sync);
    }

    #[test]
    fn test_http_transport_endpoint_join() {
        let transport =
            HttpTransport::new(Url::parse("https://confab.example/api/").unwrap()).unwrap();
        assert_eq!(transport.endpoint.as_str(), "https://confab.example/api/sync");
    }
}
