//! OCPP 1.6 dispatch table
//!
//! Decodes the CALL payload into the action's typed request, runs the
//! session manager handler and encodes the typed response.

use rust_ocpp::v1_6::messages::authorize::AuthorizeRequest;
use rust_ocpp::v1_6::messages::boot_notification::BootNotificationRequest;
use rust_ocpp::v1_6::messages::data_transfer::DataTransferRequest;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatRequest;
use rust_ocpp::v1_6::messages::meter_values::MeterValuesRequest;
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionRequest;
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::application::charging::session::OcppSessionManager;
use crate::domain::OcppError;

/// Actions a charge point may send us
pub const SUPPORTED_ACTIONS: [&str; 8] = [
    "BootNotification",
    "Heartbeat",
    "Authorize",
    "StartTransaction",
    "StopTransaction",
    "StatusNotification",
    "MeterValues",
    "DataTransfer",
];

pub(crate) async fn dispatch(
    manager: &OcppSessionManager,
    charge_point_id: &str,
    action: &str,
    payload: Value,
) -> Result<Value, OcppError> {
    match action {
        "BootNotification" => {
            let req: BootNotificationRequest = decode(action, payload)?;
            encode(action, &manager.handle_boot_notification(charge_point_id, &req))
        }
        "Heartbeat" => {
            let _: HeartbeatRequest = decode(action, payload)?;
            encode(action, &manager.handle_heartbeat(charge_point_id))
        }
        "Authorize" => {
            let req: AuthorizeRequest = decode(action, payload)?;
            encode(action, &manager.handle_authorize(charge_point_id, &req))
        }
        "StartTransaction" => {
            let req: StartTransactionRequest = decode(action, payload)?;
            encode(action, &manager.handle_start_transaction(charge_point_id, &req))
        }
        "StopTransaction" => {
            let req: StopTransactionRequest = decode(action, payload)?;
            let resp = manager.handle_stop_transaction(charge_point_id, &req).await;
            encode(action, &resp)
        }
        "StatusNotification" => {
            let req: StatusNotificationRequest = decode(action, payload)?;
            encode(action, &manager.handle_status_notification(charge_point_id, &req))
        }
        "MeterValues" => {
            let req: MeterValuesRequest = decode(action, payload)?;
            let resp = manager.handle_meter_values(charge_point_id, &req).await;
            encode(action, &resp)
        }
        "DataTransfer" => {
            let req: DataTransferRequest = decode(action, payload)?;
            encode(action, &manager.handle_data_transfer(charge_point_id, &req))
        }
        other => Err(OcppError::UnsupportedAction(other.to_string())),
    }
}

fn decode<T: DeserializeOwned>(action: &str, payload: Value) -> Result<T, OcppError> {
    serde_json::from_value(payload).map_err(|e| OcppError::Decode {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

fn encode<T: Serialize>(action: &str, response: &T) -> Result<Value, OcppError> {
    serde_json::to_value(response).map_err(|e| OcppError::Encode {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn every_supported_action_is_dispatched() {
        let manager = OcppSessionManager::default();
        for action in SUPPORTED_ACTIONS {
            let result = dispatch(&manager, "CP1", action, json!({})).await;
            assert!(
                !matches!(result, Err(OcppError::UnsupportedAction(_))),
                "{action} fell through the table"
            );
        }
    }

    #[tokio::test]
    async fn bad_payload_is_a_decode_error() {
        let manager = OcppSessionManager::default();
        let err = dispatch(&manager, "CP1", "Authorize", json!({"idTag": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, OcppError::Decode { ref action, .. } if action == "Authorize"));
        assert_eq!(err.error_code(), "InternalError");
    }

    #[tokio::test]
    async fn heartbeat_returns_current_time() {
        let manager = OcppSessionManager::default();
        let resp = dispatch(&manager, "CP1", "Heartbeat", json!({})).await.unwrap();
        assert!(resp["currentTime"].is_string());
    }

    #[tokio::test]
    async fn unknown_action_is_not_supported() {
        let manager = OcppSessionManager::default();
        let err = dispatch(&manager, "CP1", "FirmwareStatusNotification", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NotSupported");
    }
}
