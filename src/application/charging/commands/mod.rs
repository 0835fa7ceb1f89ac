//! Outbound commands from the central system to a charge point
//!
//! Commands are fire-and-forget: a CALL is queued on the charge point's
//! connection and remembered in the session's pending table, but nobody
//! waits for the reply. The CALL_RESULT / CALL_ERROR is only logged when
//! it arrives.

mod remote_start;
mod remote_stop;
mod reset;

pub use reset::ResetKind;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::charging::session::OcppSessionManager;
use crate::support::ocpp_frame::OcppFrame;

/// Why an outbound CALL was not sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("charge point {0} not connected")]
    NotConnected(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("failed to send: {0}")]
    SendFailed(String),
}

impl OcppSessionManager {
    /// Queue `action` for the charge point and return the CALL's unique id.
    pub fn send_call<T: Serialize>(
        &self,
        charge_point_id: &str,
        action: &str,
        request: &T,
    ) -> Result<String, CommandError> {
        let session = self
            .session(charge_point_id)
            .ok_or_else(|| CommandError::NotConnected(charge_point_id.to_string()))?;

        let payload =
            serde_json::to_value(request).map_err(|e| CommandError::Serialization(e.to_string()))?;

        let unique_id = Uuid::new_v4().to_string();
        let frame = OcppFrame::Call {
            unique_id: unique_id.clone(),
            action: action.to_string(),
            payload,
        };

        session.record_pending(unique_id.as_str(), action);
        if let Err(e) = session.send(frame.serialize()) {
            session.take_pending(&unique_id);
            return Err(CommandError::SendFailed(e));
        }

        info!(charge_point_id, action, unique_id = unique_id.as_str(), "Sent command");
        Ok(unique_id)
    }

    /// A charge point answered one of our CALLs.
    pub fn handle_call_result(&self, charge_point_id: &str, unique_id: &str, payload: &Value) {
        match self
            .session(charge_point_id)
            .and_then(|session| session.take_pending(unique_id))
        {
            Some(call) => info!(
                charge_point_id,
                unique_id,
                action = call.action.as_str(),
                %payload,
                "Received response"
            ),
            None => warn!(
                charge_point_id,
                unique_id, "Received response for unknown request"
            ),
        }
    }

    /// A charge point rejected one of our CALLs.
    pub fn handle_call_error(
        &self,
        charge_point_id: &str,
        unique_id: &str,
        error_code: &str,
        error_description: &str,
    ) {
        match self
            .session(charge_point_id)
            .and_then(|session| session.take_pending(unique_id))
        {
            Some(call) => warn!(
                charge_point_id,
                unique_id,
                action = call.action.as_str(),
                error_code,
                error_description,
                "Received error"
            ),
            None => warn!(
                charge_point_id,
                unique_id, error_code, "Received error for unknown request"
            ),
        }
    }
}
