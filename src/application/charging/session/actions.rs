//! OCPP 1.6 action handlers
//!
//! Each handler maps a typed request to a typed response and applies the
//! side effect to the calling charge point's session. A charge point whose
//! session is already gone still gets an answer; only the state update is
//! skipped.

use chrono::Utc;
use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, ChargePointStatus, DataTransferStatus, IdTagInfo,
    RegistrationStatus as BootStatus,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::{ConnectorStatus, Transaction};
use crate::infrastructure::storage::{MeterSample, MeterValuesRecord};

use super::registry::OcppSessionManager;

const DEFAULT_MEASURAND: &str = "Energy.Active.Import.Register";

impl OcppSessionManager {
    pub fn handle_boot_notification(
        &self,
        charge_point_id: &str,
        req: &BootNotificationRequest,
    ) -> BootNotificationResponse {
        info!(
            charge_point_id,
            vendor = req.charge_point_vendor.as_str(),
            model = req.charge_point_model.as_str(),
            firmware = ?req.firmware_version,
            "BootNotification"
        );

        if let Some(session) = self.session(charge_point_id) {
            session.accept_registration();
            session.set_configuration("ChargePointVendor", req.charge_point_vendor.as_str());
            session.set_configuration("ChargePointModel", req.charge_point_model.as_str());
            if let Some(firmware) = &req.firmware_version {
                session.set_configuration("FirmwareVersion", firmware.as_str());
            }
        }

        BootNotificationResponse {
            current_time: Utc::now(),
            interval: self.heartbeat_interval(),
            status: BootStatus::Accepted,
        }
    }

    pub fn handle_heartbeat(&self, charge_point_id: &str) -> HeartbeatResponse {
        debug!(charge_point_id, "Heartbeat");

        if let Some(session) = self.session(charge_point_id) {
            session.touch_heartbeat();
        }

        HeartbeatResponse {
            current_time: Utc::now(),
        }
    }

    /// Any non-blank tag is accepted.
    pub fn handle_authorize(&self, charge_point_id: &str, req: &AuthorizeRequest) -> AuthorizeResponse {
        let status = tag_status(&req.id_tag);
        info!(charge_point_id, id_tag = req.id_tag.as_str(), ?status, "Authorize");

        AuthorizeResponse {
            id_tag_info: IdTagInfo {
                status,
                expiry_date: None,
                parent_id_tag: None,
            },
        }
    }

    pub fn handle_start_transaction(
        &self,
        charge_point_id: &str,
        req: &StartTransactionRequest,
    ) -> StartTransactionResponse {
        let transaction_id = self.allocate_transaction_id();

        info!(
            charge_point_id,
            connector_id = req.connector_id,
            id_tag = req.id_tag.as_str(),
            meter_start = req.meter_start,
            transaction_id,
            "StartTransaction"
        );

        match self.session(charge_point_id) {
            Some(session) => {
                session.insert_transaction(Transaction::start(
                    transaction_id,
                    charge_point_id,
                    req.connector_id,
                    req.id_tag.as_str(),
                    req.meter_start,
                ));
                session
                    .connector_mut(req.connector_id)
                    .begin_transaction(transaction_id);
            }
            None => warn!(
                charge_point_id,
                transaction_id, "StartTransaction without a live session, state not recorded"
            ),
        }

        StartTransactionResponse {
            transaction_id,
            id_tag_info: accepted(),
        }
    }

    /// Unknown transaction ids change nothing and are still accepted.
    pub async fn handle_stop_transaction(
        &self,
        charge_point_id: &str,
        req: &StopTransactionRequest,
    ) -> StopTransactionResponse {
        info!(
            charge_point_id,
            transaction_id = req.transaction_id,
            meter_stop = req.meter_stop,
            reason = ?req.reason,
            "StopTransaction"
        );

        let finished = self.session(charge_point_id).and_then(|session| {
            let mut transaction = session.remove_transaction(req.transaction_id)?;
            transaction.stop(req.meter_stop, req.reason.as_ref().and_then(wire_name));

            session
                .connector_mut(transaction.connector_id)
                .end_transaction();
            Some(transaction)
        });

        match finished {
            Some(transaction) => {
                info!(
                    charge_point_id,
                    transaction_id = transaction.id,
                    energy_wh = ?transaction.energy_consumed(),
                    "Transaction completed"
                );
                if let Err(e) = self.store.persist_transaction(&transaction).await {
                    error!(charge_point_id, transaction_id = transaction.id, error = %e, "Failed to persist transaction");
                }
            }
            None => warn!(
                charge_point_id,
                transaction_id = req.transaction_id,
                "StopTransaction for unknown transaction"
            ),
        }

        StopTransactionResponse {
            id_tag_info: Some(accepted()),
        }
    }

    /// Records whatever the charge point reports; transitions are not validated.
    pub fn handle_status_notification(
        &self,
        charge_point_id: &str,
        req: &StatusNotificationRequest,
    ) -> StatusNotificationResponse {
        let error_code = wire_name(&req.error_code).unwrap_or_else(|| format!("{:?}", req.error_code));

        info!(
            charge_point_id,
            connector_id = req.connector_id,
            status = ?req.status,
            error_code = error_code.as_str(),
            "StatusNotification"
        );

        if let Some(session) = self.session(charge_point_id) {
            session
                .connector_mut(req.connector_id)
                .report(connector_status(&req.status), error_code);
        }

        StatusNotificationResponse {}
    }

    pub async fn handle_meter_values(
        &self,
        charge_point_id: &str,
        req: &MeterValuesRequest,
    ) -> MeterValuesResponse {
        let samples: Vec<MeterSample> = req
            .meter_value
            .iter()
            .flat_map(|meter_value| {
                meter_value.sampled_value.iter().map(|sampled| MeterSample {
                    timestamp: meter_value.timestamp,
                    measurand: sampled
                        .measurand
                        .as_ref()
                        .and_then(wire_name)
                        .unwrap_or_else(|| DEFAULT_MEASURAND.to_string()),
                    value: sampled.value.clone(),
                    unit: sampled.unit.as_ref().and_then(wire_name),
                })
            })
            .collect();

        info!(
            charge_point_id,
            connector_id = req.connector_id,
            transaction_id = ?req.transaction_id,
            samples = samples.len(),
            "MeterValues"
        );

        let record = MeterValuesRecord {
            charge_point_id: charge_point_id.to_string(),
            connector_id: req.connector_id,
            transaction_id: req.transaction_id,
            samples,
        };
        if let Err(e) = self.store.persist_meter_values(&record).await {
            error!(charge_point_id, error = %e, "Failed to persist meter values");
        }

        MeterValuesResponse {}
    }

    /// Vendor payloads are acknowledged, never interpreted.
    pub fn handle_data_transfer(
        &self,
        charge_point_id: &str,
        req: &DataTransferRequest,
    ) -> DataTransferResponse {
        info!(
            charge_point_id,
            vendor_id = req.vendor_string.as_str(),
            message_id = ?req.message_id,
            "DataTransfer"
        );

        DataTransferResponse {
            status: DataTransferStatus::Accepted,
            data: None,
        }
    }
}

fn accepted() -> IdTagInfo {
    IdTagInfo {
        status: AuthorizationStatus::Accepted,
        expiry_date: None,
        parent_id_tag: None,
    }
}

fn tag_status(id_tag: &str) -> AuthorizationStatus {
    if id_tag.trim().is_empty() {
        AuthorizationStatus::Invalid
    } else {
        AuthorizationStatus::Accepted
    }
}

fn connector_status(status: &ChargePointStatus) -> ConnectorStatus {
    match status {
        ChargePointStatus::Available => ConnectorStatus::Available,
        ChargePointStatus::Preparing => ConnectorStatus::Preparing,
        ChargePointStatus::Charging => ConnectorStatus::Charging,
        ChargePointStatus::SuspendedEV => ConnectorStatus::SuspendedEV,
        ChargePointStatus::SuspendedEVSE => ConnectorStatus::SuspendedEVSE,
        ChargePointStatus::Finishing => ConnectorStatus::Finishing,
        ChargePointStatus::Reserved => ConnectorStatus::Reserved,
        ChargePointStatus::Unavailable => ConnectorStatus::Unavailable,
        ChargePointStatus::Faulted => ConnectorStatus::Faulted,
    }
}

/// The string an OCPP enum takes on the wire, e.g. `EVDisconnected`.
fn wire_name<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()?
        .as_str()
        .map(str::to_owned)
}

// ── Tests ──────────────────────────────────────────────────────
