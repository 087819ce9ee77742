// ── Controller session ──
//
// Owns one out-of-band session, its on-disk inventory cache and the
// keepalive/reconnect policy. Every device request for a connection
// goes through here, from the connection's worker only.

use std::sync::Arc;

use ipmilink_api::IpmiTransport;
use ipmilink_api::types::COMPLETION_OK;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::address::VendorCommandAddress;
use crate::cache::{self, CacheStatus, InventoryCache};
use crate::config::ConnectionConfig;
use crate::error::{CoreError, ErrorContext};
use crate::model::{Entity, fields};
use crate::sdr::{FruLocatorRecord, InventoryHeader, LedColor, LedRecord, SensorRecord, round2};
use crate::vendor::VendorCommandRegistry;

/// Mask of the six readable-threshold bits.
const THRESHOLDS_READABLE_MASK: u8 = 0x3F;

/// Status LEDs are numbered 0..=3.
const STATUS_LED_COUNT: u8 = 4;

/// Discrete state bits in a sensor reading.
const EVENT_MASK_BITS: u16 = 0x7FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct ControllerSession {
    config: ConnectionConfig,
    transport: Box<dyn IpmiTransport>,
    vendors: Arc<VendorCommandRegistry>,
    state: ConnectionState,
    idle_since: Instant,
    disconnected_at: Option<Instant>,
    cache: Option<Arc<InventoryCache>>,
}

impl std::fmt::Debug for ControllerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerSession")
            .field("id", &self.config.id)
            .field("host", &self.config.session.hostname)
            .field("state", &self.state)
            .field("cache_open", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl ControllerSession {
    /// A disconnected session. Nothing is sent until [`connect`](Self::connect).
    pub fn new(
        config: ConnectionConfig,
        transport: Box<dyn IpmiTransport>,
        vendors: Arc<VendorCommandRegistry>,
    ) -> Self {
        Self {
            config,
            transport,
            vendors,
            state: ConnectionState::Disconnected,
            idle_since: Instant::now(),
            disconnected_at: None,
            cache: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn hostname(&self) -> &str {
        self.config.hostname()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn vendors(&self) -> &VendorCommandRegistry {
        &self.vendors
    }

    /// The currently open inventory cache, if any.
    pub fn cache(&self) -> Option<Arc<InventoryCache>> {
        self.cache.clone()
    }

    pub fn cache_header(&self) -> Option<InventoryHeader> {
        self.cache.as_ref().map(|c| c.header)
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext {
            connection: self.config.id.clone(),
            host: self.config.session.hostname.clone(),
            sensor: None,
        }
    }

    fn context_for(&self, sensor: Option<&SensorRecord>) -> ErrorContext {
        ErrorContext {
            sensor: sensor.map(SensorRecord::label),
            ..self.context()
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the session. Does not retry.
    pub async fn connect(&mut self) -> Result<(), CoreError> {
        debug!(
            connection = %self.config.id,
            host = %self.hostname(),
            protocol = %self.config.session.protocol,
            privilege = %self.config.session.privilege,
            "opening session"
        );
        match self.transport.open_session(&self.config.session).await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.touch();
                info!(connection = %self.config.id, host = %self.hostname(), "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(CoreError::from(e).with_context(&self.context()))
            }
        }
    }

    /// Close the session and start the reconnect cooldown.
    pub async fn disconnect(&mut self) {
        self.transport.close_session().await;
        self.state = ConnectionState::Disconnected;
        self.cache = None;
        self.disconnected_at = Some(Instant::now());
        info!(connection = %self.config.id, host = %self.hostname(), "disconnected");
    }

    /// Whether the reconnect cooldown has elapsed. A connection that has
    /// never been up is eligible immediately.
    pub fn reconnect_due(&self) -> bool {
        self.disconnected_at
            .is_none_or(|at| at.elapsed() >= self.config.reconnect_cooldown)
    }

    /// Re-establish the session and then the cache. A failure restarts
    /// the cooldown.
    pub async fn reconnect(&mut self) -> Result<(), CoreError> {
        info!(connection = %self.config.id, host = %self.hostname(), "reconnecting");
        if let Err(e) = self.connect().await {
            self.disconnected_at = Some(Instant::now());
            return Err(e);
        }
        if let Err(e) = self.open_or_create_cache().await {
            if self.is_connected() {
                self.disconnect().await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Periodic maintenance: keepalive when connected and idle, reconnect
    /// when disconnected and the cooldown has passed.
    pub async fn process(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                if self.idle_since.elapsed() > self.config.session.session_timeout / 2 {
                    self.keepalive().await;
                }
            }
            ConnectionState::Disconnected => {
                if self.reconnect_due() {
                    if let Err(e) = self.reconnect().await {
                        warn!(connection = %self.config.id, error = %e, "reconnect failed");
                    }
                }
            }
        }
    }

    async fn keepalive(&mut self) {
        debug!(connection = %self.config.id, "keepalive");
        if let Err(e) = self.live_header().await {
            warn!(connection = %self.config.id, error = %e, "keepalive failed");
            if self.is_connected() {
                self.disconnect().await;
            }
        }
    }

    // ── Inventory cache ──────────────────────────────────────────────

    /// Open the cache file, recreating it from the live repository when it
    /// is missing, structurally invalid, or describes a different header.
    pub async fn open_or_create_cache(&mut self) -> Result<(), CoreError> {
        let live = self.live_header().await?;
        let path = self.config.cache_path();
        let path_display = path.display().to_string();

        match InventoryCache::inspect(&path)? {
            CacheStatus::Valid(cache) if !cache.header.differs_from(&live) => {
                debug!(path = %path_display, records = cache.records.len(), "inventory cache opened");
                self.cache = Some(Arc::new(cache));
                return Ok(());
            }
            CacheStatus::Valid(cache) => {
                info!(
                    path = %path_display,
                    changes = %cache.header.changes(&live).join(", "),
                    "inventory cache is stale"
                );
            }
            CacheStatus::Invalid(reason) => {
                warn!(path = %path_display, reason = %reason, "inventory cache is invalid");
            }
            CacheStatus::Missing => {
                info!(path = %path_display, "no inventory cache");
            }
        }
        self.create_cache(live).await
    }

    /// Delete the cache and recreate it from the live repository.
    pub async fn rebuild_cache(&mut self) -> Result<(), CoreError> {
        let live = self.live_header().await?;
        self.create_cache(live).await
    }

    async fn create_cache(&mut self, header: InventoryHeader) -> Result<(), CoreError> {
        let path = self.config.cache_path();
        self.cache = None;
        cache::remove(&path)?;

        let walked = cache::read_repository(self.transport.as_mut(), &header).await;
        let records = match walked {
            Ok(records) => {
                self.touch();
                records
            }
            Err(e) => return Err(self.fail(e, None).await),
        };

        InventoryCache::new(&self.config.id, self.hostname(), header, records).write(&path)?;
        let reopened = InventoryCache::load(&path)?;
        info!(
            connection = %self.config.id,
            path = %path.display(),
            records = reopened.records.len(),
            "inventory cache created"
        );
        self.cache = Some(Arc::new(reopened));
        Ok(())
    }

    /// Query "Get SDR Repository Info" from the controller itself.
    pub async fn live_header(&mut self) -> Result<InventoryHeader, CoreError> {
        self.ensure_connected(None)?;
        let result = self.transport.sdr_repository_info().await;
        let info = self.settle(result, None).await?;
        self.completion(info.completion_code, "Get SDR Repository Info", None)?;
        Ok(InventoryHeader::from(info))
    }

    // ── Sensors ──────────────────────────────────────────────────────

    /// Read a sensor. Threshold sensors with an analog reading also get
    /// their thresholds and hysteresis; everything else reports the
    /// discrete state mask as `VAL`.
    pub async fn read_sensor(&mut self, sensor: &SensorRecord) -> Result<Entity, CoreError> {
        self.ensure_connected(Some(sensor))?;
        let result = self
            .transport
            .sensor_reading(sensor.target(), sensor.sensor_number)
            .await;
        let reading = self.settle(result, Some(sensor)).await?;
        self.completion(reading.completion_code, "Get Sensor Reading", Some(sensor))?;

        let mut entity = Entity::new();
        match sensor.decoding.as_ref() {
            Some(params) if sensor.is_threshold() && !reading.reading_unavailable => {
                entity.set(fields::VAL, round2(params.scale(reading.raw)));
                self.read_thresholds(&mut entity, sensor).await?;
                self.read_hysteresis(&mut entity, sensor).await?;
            }
            _ => entity.set(
                fields::VAL,
                f64::from(reading.event_mask & EVENT_MASK_BITS),
            ),
        }
        Ok(entity)
    }

    /// Fill `LOLO`/`LOW`/`HIGH`/`HIHI` for readable thresholds and the
    /// raw readable mask.
    pub async fn read_thresholds(
        &mut self,
        entity: &mut Entity,
        sensor: &SensorRecord,
    ) -> Result<(), CoreError> {
        self.ensure_connected(Some(sensor))?;
        let params = *sensor
            .decoding()
            .map_err(|e| e.with_context(&self.context_for(Some(sensor))))?;
        let result = self
            .transport
            .sensor_thresholds(sensor.target(), sensor.sensor_number)
            .await;
        let thresholds = self.settle(result, Some(sensor)).await?;
        self.completion(thresholds.completion_code, "Get Sensor Thresholds", Some(sensor))?;

        let readable = thresholds.readable & THRESHOLDS_READABLE_MASK;
        entity.set(fields::THRESHOLDS_READABLE, readable);
        let table = [
            (0x02, fields::LOLO, thresholds.lower_critical),
            (0x01, fields::LOW, thresholds.lower_non_critical),
            (0x08, fields::HIGH, thresholds.upper_non_critical),
            (0x10, fields::HIHI, thresholds.upper_critical),
        ];
        for (bit, field, raw) in table {
            if readable & bit != 0 {
                entity.set(field, round2(params.scale(raw)));
            }
        }
        Ok(())
    }

    /// Fill `HYST` from the positive-going hysteresis.
    pub async fn read_hysteresis(
        &mut self,
        entity: &mut Entity,
        sensor: &SensorRecord,
    ) -> Result<(), CoreError> {
        self.ensure_connected(Some(sensor))?;
        let ctx = self.context_for(Some(sensor));
        let params = *sensor.decoding().map_err(|e| e.with_context(&ctx))?;
        let result = self
            .transport
            .sensor_hysteresis(sensor.target(), sensor.sensor_number)
            .await;
        let hysteresis = self.settle(result, Some(sensor)).await?;
        self.completion(hysteresis.completion_code, "Get Sensor Hysteresis", Some(sensor))?;

        let value = params
            .scale_hysteresis(hysteresis.positive_going)
            .map_err(|e| e.with_context(&ctx))?;
        entity.set(fields::HYST, round2(value).abs());
        Ok(())
    }

    // ── PICMG LEDs ───────────────────────────────────────────────────

    /// Find a FRU's status LEDs and the color each one shows.
    pub async fn discover_leds(
        &mut self,
        fru: &FruLocatorRecord,
    ) -> Result<Vec<LedRecord>, CoreError> {
        self.ensure_connected(None)?;
        let target = fru.target();
        let result = self
            .transport
            .fru_led_properties(target, fru.fru_slave_address)
            .await;
        let properties = self.settle(result, None).await?;
        self.completion(properties.completion_code, "Get FRU LED Properties", None)?;

        let mut leds = Vec::new();
        for led_id in 0..STATUS_LED_COUNT {
            if properties.status_leds & (1 << led_id) == 0 {
                continue;
            }
            let result = self
                .transport
                .led_color_capabilities(target, fru.fru_slave_address, led_id)
                .await;
            let caps = self.settle(result, None).await?;
            self.completion(caps.completion_code, "Get LED Color Capabilities", None)?;
            leds.push(LedRecord {
                device_access_address: fru.device_access_address,
                channel: fru.channel,
                fru_slave_address: fru.fru_slave_address,
                led_id,
                color: LedColor::highest_supported(caps.colors),
            });
        }
        Ok(leds)
    }

    /// Read an LED's effective function (`VAL`) and color (`COLOR`).
    pub async fn read_led(&mut self, led: &LedRecord) -> Result<Entity, CoreError> {
        self.ensure_connected(None)?;
        let result = self
            .transport
            .fru_led_state(led.target(), led.fru_slave_address, led.led_id)
            .await;
        let state = self.settle(result, None).await?;
        self.completion(state.completion_code, "Get FRU LED State", None)?;

        let (function, color) = state.effective();
        let color = LedColor::from_code(color)
            .map_or_else(|| format!("{color:#04x}"), |c| c.to_string());
        Ok(Entity::new()
            .with(fields::VAL, function)
            .with(fields::COLOR, color))
    }

    // ── Vendor commands ──────────────────────────────────────────────

    /// Run a vendor command. Unknown vendor/command pairs are ignored.
    pub async fn dispatch_vendor_command(
        &mut self,
        address: &VendorCommandAddress,
        entity: &Entity,
    ) -> Result<(), CoreError> {
        let Some(handler) = self
            .vendors
            .find(&address.vendor_id, &address.command_id)
            .cloned()
        else {
            debug!(
                vendor = %address.vendor_id,
                command = %address.command_id,
                "unknown vendor command ignored"
            );
            return Ok(());
        };
        self.ensure_connected(None)?;

        let result = handler(self.transport.as_mut(), address.args.as_slice(), entity).await;
        match result {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(e) => Err(self.fail(e, None).await),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn touch(&mut self) {
        self.idle_since = Instant::now();
    }

    fn ensure_connected(&self, sensor: Option<&SensorRecord>) -> Result<(), CoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CoreError::Disconnected {
                context: self.context_for(sensor),
            })
        }
    }

    fn completion(
        &self,
        code: u8,
        command: &str,
        sensor: Option<&SensorRecord>,
    ) -> Result<(), CoreError> {
        if code == COMPLETION_OK {
            return Ok(());
        }
        Err(
            CoreError::protocol(format!("{command} returned completion code {code:#04x}"))
                .with_context(&self.context_for(sensor)),
        )
    }

    /// Count a successful exchange as activity, or turn a failure into a
    /// contextual error.
    async fn settle<T>(
        &mut self,
        result: Result<T, ipmilink_api::Error>,
        sensor: Option<&SensorRecord>,
    ) -> Result<T, CoreError> {
        match result {
            Ok(value) => {
                self.touch();
                Ok(value)
            }
            Err(e) => Err(self.fail(e, sensor).await),
        }
    }

    /// Attach context; a session-loss error also drops the session.
    async fn fail(
        &mut self,
        err: impl Into<CoreError>,
        sensor: Option<&SensorRecord>,
    ) -> CoreError {
        let err = err.into().with_context(&self.context_for(sensor));
        if err.is_session_loss() && self.is_connected() {
            warn!(connection = %self.config.id, error = %err, "session lost");
            self.disconnect().await;
        }
        err
    }
}
