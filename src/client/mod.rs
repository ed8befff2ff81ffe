//! Client Session Monitoring
//! Mission: Keep a device's view of its session honest with what the server believes

pub mod logout;
pub mod monitor;
pub mod probe;

pub use logout::{LogoutReason, ReasonSlot};
pub use monitor::{
    ClientEvent, MonitorConfig, MonitorCore, MonitorHandle, SessionMonitor, SessionState,
};
pub use probe::{HttpSessionClient, LoginRejection, SessionProbe};
