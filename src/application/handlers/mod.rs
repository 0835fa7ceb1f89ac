//! OCPP message handlers

mod ocpp_router;
mod ocpp_v16;

pub use ocpp_router::OcppMessageRouter;
pub use ocpp_v16::SUPPORTED_ACTIONS;
