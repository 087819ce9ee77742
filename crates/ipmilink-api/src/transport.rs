// ── Transport seam ──
//
// One implementation per codec backend. A transport owns at most one
// open session; the engine drives it from a single task, so every
// method takes `&mut self`.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Error;
use crate::session::SessionParams;
use crate::types::{
    IpmbTarget, LedColorCapabilities, LedProperties, LedState, SdrEntry, SdrRepositoryInfo,
    SensorHysteresis, SensorReading, SensorThresholds,
};

/// A management-protocol transport and codec.
///
/// Implementations translate typed requests into wire frames, bridge
/// them to `target` when it is not the BMC, and decode the response.
/// A non-zero completion code is *not* an error at this layer; it is
/// returned in the response for the caller to judge.
#[async_trait]
pub trait IpmiTransport: Send {
    /// Open an out-of-band session. Closes any previous session first.
    async fn open_session(&mut self, params: &SessionParams) -> Result<(), Error>;

    /// Tear down the session. Never fails; a dead session is simply dropped.
    async fn close_session(&mut self);

    /// "Get SDR Repository Info" (storage net function, BMC).
    async fn sdr_repository_info(&mut self) -> Result<SdrRepositoryInfo, Error>;

    /// "Get SDR" for one whole record.
    async fn get_sdr(&mut self, record_id: u16) -> Result<SdrEntry, Error>;

    async fn sensor_reading(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorReading, Error>;

    async fn sensor_thresholds(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorThresholds, Error>;

    async fn sensor_hysteresis(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorHysteresis, Error>;

    async fn fru_led_properties(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
    ) -> Result<LedProperties, Error>;

    async fn led_color_capabilities(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
        led_id: u8,
    ) -> Result<LedColorCapabilities, Error>;

    async fn fru_led_state(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
        led_id: u8,
    ) -> Result<LedState, Error>;

    /// Send a raw request body (command byte first) and return the raw
    /// response body (command byte, completion code, data...).
    async fn raw(&mut self, target: IpmbTarget, net_fn: u8, request: &[u8])
    -> Result<Bytes, Error>;
}
