// ── Scriptable in-memory transport ──
//
// Behaves like a controller whose repository, readings and LEDs are set
// up by the test. The `MockHandle` keeps access to the shared state
// after the transport itself has been moved into a session.

pub mod sdr;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Error;
use crate::session::SessionParams;
use crate::transport::IpmiTransport;
use crate::types::{
    IpmbTarget, LedColorCapabilities, LedProperties, LedState, SDR_LAST_RECORD, SdrEntry,
    SdrRepositoryInfo, SensorHysteresis, SensorReading, SensorThresholds,
};

/// "Requested sensor, data, or record not present."
pub const CC_NOT_PRESENT: u8 = 0xCB;

/// One request sent through [`IpmiTransport::raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub target: IpmbTarget,
    pub net_fn: u8,
    pub data: Vec<u8>,
}

/// Everything the mock controller knows. Sensor maps are keyed by
/// `(slave_address, sensor_number)`, LED maps by
/// `(slave_address, fru_device_id[, led_id])`.
#[derive(Debug)]
pub struct MockState {
    pub reachable: bool,
    pub session_open: bool,
    pub open_attempts: u32,
    pub last_params: Option<SessionParams>,
    pub records: Vec<Bytes>,
    pub info: SdrRepositoryInfo,
    pub info_error: Option<Error>,
    pub readings: HashMap<(u8, u8), Result<SensorReading, Error>>,
    pub thresholds: HashMap<(u8, u8), SensorThresholds>,
    pub hysteresis: HashMap<(u8, u8), SensorHysteresis>,
    pub led_properties: HashMap<(u8, u8), Result<LedProperties, Error>>,
    pub led_colors: HashMap<(u8, u8, u8), LedColorCapabilities>,
    pub led_states: HashMap<(u8, u8, u8), LedState>,
    pub raw_responses: VecDeque<Result<Bytes, Error>>,
    pub raw_requests: Vec<RawRequest>,
    pub calls: Vec<&'static str>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            reachable: true,
            session_open: false,
            open_attempts: 0,
            last_params: None,
            records: Vec::new(),
            info: SdrRepositoryInfo {
                sdr_version: 0x51,
                ..SdrRepositoryInfo::default()
            },
            info_error: None,
            readings: HashMap::new(),
            thresholds: HashMap::new(),
            hysteresis: HashMap::new(),
            led_properties: HashMap::new(),
            led_colors: HashMap::new(),
            led_states: HashMap::new(),
            raw_responses: VecDeque::new(),
            raw_requests: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl MockState {
    /// Replace the repository and keep the header's record count in step.
    pub fn set_records(&mut self, records: Vec<Bytes>) {
        self.info.record_count = u16::try_from(records.len()).unwrap_or(u16::MAX);
        self.records = records;
    }

    /// Number of times `name` was called.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.iter().filter(|c| **c == name).count()
    }
}

/// Shared access to a [`MockTransport`]'s state.
#[derive(Debug, Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`IpmiTransport`].
#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    /// Lock the state for a call that needs an open session.
    fn session(&self, call: &'static str) -> Result<MutexGuard<'_, MockState>, Error> {
        let mut state = self.handle.state();
        state.calls.push(call);
        if state.session_open {
            Ok(state)
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl IpmiTransport for MockTransport {
    async fn open_session(&mut self, params: &SessionParams) -> Result<(), Error> {
        let mut state = self.handle.state();
        state.calls.push("open_session");
        state.open_attempts += 1;
        state.last_params = Some(params.clone());
        if state.reachable {
            state.session_open = true;
            Ok(())
        } else {
            state.session_open = false;
            Err(Error::SessionOpen {
                host: params.hostname.clone(),
                message: "connection timed out".into(),
            })
        }
    }

    async fn close_session(&mut self) {
        let mut state = self.handle.state();
        state.calls.push("close_session");
        state.session_open = false;
    }

    async fn sdr_repository_info(&mut self) -> Result<SdrRepositoryInfo, Error> {
        let state = self.session("sdr_repository_info")?;
        match &state.info_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.info),
        }
    }

    async fn get_sdr(&mut self, record_id: u16) -> Result<SdrEntry, Error> {
        let state = self.session("get_sdr")?;
        let index = usize::from(record_id);
        let Some(data) = state.records.get(index).cloned() else {
            return Ok(SdrEntry {
                completion_code: CC_NOT_PRESENT,
                next_record_id: SDR_LAST_RECORD,
                data: Bytes::new(),
            });
        };
        let next_record_id = if index + 1 < state.records.len() {
            record_id + 1
        } else {
            SDR_LAST_RECORD
        };
        Ok(SdrEntry {
            completion_code: 0,
            next_record_id,
            data,
        })
    }

    async fn sensor_reading(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorReading, Error> {
        let state = self.session("sensor_reading")?;
        state
            .readings
            .get(&(target.slave_address, sensor_number))
            .cloned()
            .unwrap_or_else(|| {
                Err(Error::Command {
                    code: Error::READING_UNAVAILABLE_CODE,
                    message: "sensor reading unavailable".into(),
                })
            })
    }

    async fn sensor_thresholds(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorThresholds, Error> {
        let state = self.session("sensor_thresholds")?;
        Ok(state
            .thresholds
            .get(&(target.slave_address, sensor_number))
            .copied()
            .unwrap_or(SensorThresholds {
                completion_code: CC_NOT_PRESENT,
                ..SensorThresholds::default()
            }))
    }

    async fn sensor_hysteresis(
        &mut self,
        target: IpmbTarget,
        sensor_number: u8,
    ) -> Result<SensorHysteresis, Error> {
        let state = self.session("sensor_hysteresis")?;
        Ok(state
            .hysteresis
            .get(&(target.slave_address, sensor_number))
            .copied()
            .unwrap_or(SensorHysteresis {
                completion_code: CC_NOT_PRESENT,
                ..SensorHysteresis::default()
            }))
    }

    async fn fru_led_properties(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
    ) -> Result<LedProperties, Error> {
        let state = self.session("fru_led_properties")?;
        state
            .led_properties
            .get(&(target.slave_address, fru_device_id))
            .cloned()
            .unwrap_or(Ok(LedProperties {
                completion_code: CC_NOT_PRESENT,
                ..LedProperties::default()
            }))
    }

    async fn led_color_capabilities(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
        led_id: u8,
    ) -> Result<LedColorCapabilities, Error> {
        let state = self.session("led_color_capabilities")?;
        Ok(state
            .led_colors
            .get(&(target.slave_address, fru_device_id, led_id))
            .copied()
            .unwrap_or(LedColorCapabilities {
                completion_code: CC_NOT_PRESENT,
                ..LedColorCapabilities::default()
            }))
    }

    async fn fru_led_state(
        &mut self,
        target: IpmbTarget,
        fru_device_id: u8,
        led_id: u8,
    ) -> Result<LedState, Error> {
        let state = self.session("fru_led_state")?;
        Ok(state
            .led_states
            .get(&(target.slave_address, fru_device_id, led_id))
            .copied()
            .unwrap_or(LedState {
                completion_code: CC_NOT_PRESENT,
                ..LedState::default()
            }))
    }

    async fn raw(
        &mut self,
        target: IpmbTarget,
        net_fn: u8,
        request: &[u8],
    ) -> Result<Bytes, Error> {
        let mut state = self.session("raw")?;
        state.raw_requests.push(RawRequest {
            target,
            net_fn,
            data: request.to_vec(),
        });
        state.raw_responses.pop_front().unwrap_or_else(|| {
            let cmd = request.first().copied().unwrap_or_default();
            Ok(Bytes::from(vec![cmd, 0x00]))
        })
    }
}
