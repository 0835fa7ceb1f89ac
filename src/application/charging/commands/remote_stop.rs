//! RemoteStopTransaction command

use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use tracing::{info, warn};

use crate::application::charging::session::OcppSessionManager;
use crate::domain::CommandStatus;

impl OcppSessionManager {
    pub fn remote_stop_transaction(
        &self,
        charge_point_id: &str,
        transaction_id: i32,
    ) -> Option<CommandStatus> {
        info!(charge_point_id, transaction_id, "RemoteStopTransaction");

        let request = RemoteStopTransactionRequest { transaction_id };

        match self.send_call(charge_point_id, "RemoteStopTransaction", &request) {
            Ok(_) => Some(CommandStatus::Accepted),
            Err(e) => {
                warn!(charge_point_id, error = %e, "RemoteStopTransaction not sent");
                None
            }
        }
    }
}
