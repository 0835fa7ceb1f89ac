//! RemoteStartTransaction command

use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use tracing::{info, warn};

use crate::application::charging::session::OcppSessionManager;
use crate::domain::CommandStatus;

impl OcppSessionManager {
    /// Ask the charge point to start charging for `id_tag`.
    ///
    /// `None` when the charge point is not connected or the send failed.
    pub fn remote_start_transaction(
        &self,
        charge_point_id: &str,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> Option<CommandStatus> {
        info!(charge_point_id, id_tag, ?connector_id, "RemoteStartTransaction");

        let request = RemoteStartTransactionRequest {
            connector_id,
            id_tag: id_tag.to_string(),
            charging_profile: None,
        };

        match self.send_call(charge_point_id, "RemoteStartTransaction", &request) {
            Ok(_) => Some(CommandStatus::Accepted),
            Err(e) => {
                warn!(charge_point_id, error = %e, "RemoteStartTransaction not sent");
                None
            }
        }
    }
}
