// ipmilink-api: transport boundary for IPMI controller sessions
//
// The wire codec lives behind `IpmiTransport`; everything above it sees
// typed responses carrying completion codes.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod session;
pub mod transport;
pub mod types;

pub use error::Error;
pub use session::{AuthType, PrivilegeLevel, Protocol, SessionParams};
pub use transport::IpmiTransport;
pub use types::{
    IpmbTarget, LedColorCapabilities, LedProperties, LedState, SdrEntry, SdrRepositoryInfo,
    SensorHysteresis, SensorReading, SensorThresholds,
};
