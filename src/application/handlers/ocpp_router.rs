//! OCPP-J message router
//!
//! Parses raw frames from one charge point, dispatches CALLs through the
//! OCPP 1.6 action table and frames the answer. Replies to our own CALLs
//! go to the session manager's pending-call bookkeeping and are not
//! answered.

use serde_json::Value;
use tracing::{debug, warn};

use crate::application::charging::session::SharedSessionManager;
use crate::domain::OcppError;
use crate::support::ocpp_frame::OcppFrame;

use super::ocpp_v16;

/// Router bound to one charge point connection
pub struct OcppMessageRouter {
    pub charge_point_id: String,
    manager: SharedSessionManager,
}

impl OcppMessageRouter {
    pub fn new(charge_point_id: impl Into<String>, manager: SharedSessionManager) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            manager,
        }
    }

    /// Handle one text frame, returning the frame to send back, if any.
    pub async fn handle(&self, text: &str) -> Option<String> {
        debug!(charge_point_id = self.charge_point_id.as_str(), raw = text, "Received message");

        let frame = match OcppFrame::parse(text) {
            Ok(f) => f,
            Err(e) => {
                let unique_id = OcppFrame::recover_unique_id(text);
                let err = OcppError::Frame(e.to_string());
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    unique_id = unique_id.as_str(),
                    error = %err,
                    "Rejecting malformed message"
                );
                return Some(self.error_frame(unique_id, &err));
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.handle_call(unique_id, &action, payload).await),
            OcppFrame::CallResult { unique_id, payload } => {
                self.manager
                    .handle_call_result(&self.charge_point_id, &unique_id, &payload);
                None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.manager.handle_call_error(
                    &self.charge_point_id,
                    &unique_id,
                    &error_code,
                    &error_description,
                );
                None
            }
        }
    }

    async fn handle_call(&self, unique_id: String, action: &str, payload: Value) -> String {
        match ocpp_v16::dispatch(&self.manager, &self.charge_point_id, action, payload).await {
            Ok(response) => {
                metrics::counter!("ocpp_calls_total", "action" => action.to_string()).increment(1);
                OcppFrame::result(unique_id, response).serialize()
            }
            Err(err) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    unique_id = unique_id.as_str(),
                    action,
                    error = %err,
                    "Answering CALL with CallError"
                );
                self.error_frame(unique_id, &err)
            }
        }
    }

    fn error_frame(&self, unique_id: String, err: &OcppError) -> String {
        metrics::counter!("ocpp_call_errors_total", "code" => err.error_code()).increment(1);
        OcppFrame::error_response(unique_id, err.error_code(), err.to_string()).serialize()
    }
}
