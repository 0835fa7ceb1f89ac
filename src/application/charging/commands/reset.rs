//! Reset command

use rust_ocpp::v1_6::messages::reset::ResetRequest;
use rust_ocpp::v1_6::types::ResetRequestStatus;
use tracing::{info, warn};

use crate::application::charging::session::OcppSessionManager;
use crate::domain::CommandStatus;

/// Reset type for the charge point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Soft reset - restart without power cycle
    Soft,
    /// Hard reset - full power cycle
    Hard,
}

impl From<ResetKind> for ResetRequestStatus {
    fn from(kind: ResetKind) -> Self {
        match kind {
            ResetKind::Soft => ResetRequestStatus::Soft,
            ResetKind::Hard => ResetRequestStatus::Hard,
        }
    }
}

impl OcppSessionManager {
    pub fn reset(&self, charge_point_id: &str, kind: ResetKind) -> Option<CommandStatus> {
        info!(charge_point_id, ?kind, "Reset");

        let request = ResetRequest { kind: kind.into() };

        match self.send_call(charge_point_id, "Reset", &request) {
            Ok(_) => Some(CommandStatus::Accepted),
            Err(e) => {
                warn!(charge_point_id, error = %e, "Reset not sent");
                None
            }
        }
    }
}
