// ── Connection registry ──
//
// Explicitly constructed directory of live connections. Each entry pairs
// a connection's catalog (for lock-free address validation from any
// task) with the executor that owns its session.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use ipmilink_api::IpmiTransport;
use tracing::{error, info, warn};

use crate::address::Address;
use crate::catalog::InventoryCatalog;
use crate::config::ConnectionConfig;
use crate::error::CoreError;
use crate::executor::{Task, TaskExecutor};
use crate::model::Entity;
use crate::provider::IpmiProvider;
use crate::session::ControllerSession;
use crate::vendor::VendorCommandRegistry;

/// One registered controller.
#[derive(Debug)]
pub struct Connection {
    id: String,
    hostname: String,
    catalog: Arc<InventoryCatalog>,
    executor: TaskExecutor,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn catalog(&self) -> &Arc<InventoryCatalog> {
        &self.catalog
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
    /// Ids with a connect in flight.
    pending: DashSet<String>,
    vendors: Arc<VendorCommandRegistry>,
}

impl ConnectionRegistry {
    /// A registry using the built-in vendor commands.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vendors(vendors: VendorCommandRegistry) -> Self {
        Self {
            connections: DashMap::new(),
            pending: DashSet::new(),
            vendors: Arc::new(vendors),
        }
    }

    pub fn vendors(&self) -> &VendorCommandRegistry {
        &self.vendors
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Register a connection and start its worker. Returns `false` if it
    /// could not be registered; the reason is logged.
    pub async fn connect(&self, config: ConnectionConfig, transport: Box<dyn IpmiTransport>) -> bool {
        let id = config.id.clone();
        match self.try_connect(config, transport).await {
            Ok(()) => true,
            Err(e) => {
                error!(connection = %id, error = %e, "connection not registered");
                false
            }
        }
    }

    /// [`connect`](Self::connect), returning the reason on failure.
    ///
    /// An unreachable controller is registered anyway, disconnected, and
    /// retried by its worker. A cache that cannot be opened is fatal.
    pub async fn try_connect(
        &self,
        config: ConnectionConfig,
        transport: Box<dyn IpmiTransport>,
    ) -> Result<(), CoreError> {
        let _reservation = self.reserve(&config.id)?;
        config.validate()?;

        let id = config.id.clone();
        let hostname = config.hostname().to_owned();
        let idle_interval = config.idle_interval;
        let catalog = Arc::new(InventoryCatalog::new(&id, config.live_check_interval));
        let mut session = ControllerSession::new(config, transport, Arc::clone(&self.vendors));

        if let Err(e) = session.connect().await {
            warn!(connection = %id, host = %hostname, error = %e, "initial connect failed, will retry");
        }
        if session.is_connected() {
            session.open_or_create_cache().await?;
            if let Err(e) = catalog.load(&mut session).await {
                warn!(connection = %id, error = %e, "initial catalog load failed");
            }
        }

        let executor = TaskExecutor::spawn(
            &id,
            IpmiProvider::new(session, Arc::clone(&catalog)),
            idle_interval,
        );
        let connection = Arc::new(Connection {
            id: id.clone(),
            hostname,
            catalog,
            executor,
        });

        self.connections.insert(id.clone(), connection);
        info!(connection = %id, "connection registered");
        Ok(())
    }

    /// Claim `id` for the duration of a connect. The pending claim is
    /// taken before the registered check, so a connect that finishes in
    /// between is still seen.
    pub(crate) fn reserve(&self, id: &str) -> Result<Reservation<'_>, CoreError> {
        if !self.pending.insert(id.to_owned()) {
            return Err(duplicate(id));
        }
        let reservation = Reservation {
            pending: &self.pending,
            id: id.to_owned(),
        };
        if self.connections.contains_key(id) {
            return Err(duplicate(id));
        }
        Ok(reservation)
    }

    /// Stop every worker and forget every connection.
    pub async fn shutdown(&self) {
        let all: Vec<Arc<Connection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.connections.clear();
        for connection in all {
            connection.executor.shutdown().await;
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered connection ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Parse a link and check that what it names exists.
    pub fn resolve_address(&self, link: &str) -> Result<Address, CoreError> {
        let address = Address::parse(link)?;
        let connection = self.get(address.connection_id()).ok_or_else(|| {
            CoreError::address(
                link,
                format!("unknown connection '{}'", address.connection_id()),
            )
        })?;
        let catalog = connection.catalog();

        match &address {
            Address::Sensor(sensor) => {
                if !catalog.is_initialized() {
                    return Err(CoreError::address(
                        link,
                        format!("inventory of '{}' is not loaded", connection.id()),
                    ));
                }
                if catalog.find_sensor(&sensor.key()).is_none() {
                    return Err(CoreError::address(
                        link,
                        format!("unknown sensor '{}'", sensor.key()),
                    ));
                }
            }
            Address::Led(led) => {
                let fru = catalog.find_fru(led.fru_slave_address).ok_or_else(|| {
                    CoreError::address(link, format!("unknown FRU {}", led.fru_slave_address))
                })?;
                if fru.led(led.led_id).is_none() {
                    return Err(CoreError::address(
                        link,
                        format!("FRU '{}' has no LED {}", fru.record.id_string, led.led_id),
                    ));
                }
            }
            Address::VendorCommand(command) => {
                if !self.vendors.is_valid(&command.vendor_id, &command.command_id) {
                    return Err(CoreError::address(
                        link,
                        format!(
                            "unknown vendor command '{} {}'",
                            command.vendor_id, command.command_id
                        ),
                    ));
                }
            }
        }
        Ok(address)
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Queue work for the address's connection. Returns `false` for an
    /// unknown connection or a stopped worker; the callback then never
    /// runs.
    pub fn schedule(
        &self,
        address: &Address,
        entity: Entity,
        on_complete: impl FnOnce(Entity) + Send + 'static,
    ) -> bool {
        let Some(connection) = self.get(address.connection_id()) else {
            return false;
        };
        connection
            .executor
            .schedule(Task::new(address.clone(), entity, on_complete))
    }

    /// Schedule and wait for the completed entity.
    pub async fn execute(&self, address: &Address, entity: Entity) -> Result<Entity, CoreError> {
        let connection = self.get(address.connection_id()).ok_or_else(|| {
            CoreError::address(
                &address.to_string(),
                format!("unknown connection '{}'", address.connection_id()),
            )
        })?;
        connection.executor.execute(address.clone(), entity).await
    }
}

/// Releases a pending connect id when dropped.
pub(crate) struct Reservation<'a> {
    pending: &'a DashSet<String>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

fn duplicate(id: &str) -> CoreError {
    CoreError::Config {
        message: format!("connection '{id}' is already registered"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ipmilink_api::SessionParams;
    use ipmilink_api::mock::sdr::{FruLocator, FullSensor};
    use ipmilink_api::mock::{MockHandle, MockTransport};
    use ipmilink_api::{LedColorCapabilities, LedProperties};

    use super::*;

    fn transport() -> (Box<dyn IpmiTransport>, MockHandle) {
        let (transport, mock) = MockTransport::new();
        {
            let mut state = mock.state();
            state.set_records(vec![
                FullSensor::new(0, 30, 97, "CU TEMP1 ").encode(),
                FruLocator::new(1, 5, 30, 97, "CU1").encode(),
            ]);
            state.led_properties.insert(
                (0x82, 5),
                Ok(LedProperties {
                    status_leds: 0b0001,
                    ..LedProperties::default()
                }),
            );
            state.led_colors.insert(
                (0x82, 5, 0),
                LedColorCapabilities {
                    colors: 0b0010,
                    ..LedColorCapabilities::default()
                },
            );
        }
        (Box::new(transport), mock)
    }

    fn config(id: &str, dir: &std::path::Path) -> ConnectionConfig {
        ConnectionConfig::new(id, SessionParams::new("mch-1")).with_cache_dir(dir)
    }

    #[tokio::test]
    async fn resolves_only_what_the_catalog_knows() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let (t, _mock) = transport();
        assert!(registry.connect(config("crate1", dir.path()), t).await);

        assert!(registry.resolve_address("crate1 SENSOR 30:97 'CU TEMP1 '").is_ok());
        assert!(registry.resolve_address("crate1 PICMG_LED 5:0").is_ok());
        assert!(registry.resolve_address("crate1 OEM_CMD VT reboot").is_ok());

        for bad in [
            "crate1 SENSOR 30:97 'CU TEMP1'",
            "crate2 SENSOR 30:97 'CU TEMP1 '",
            "crate1 PICMG_LED 6:0",
            "crate1 PICMG_LED 5:1",
            "crate1 OEM_CMD acme reboot",
            "crate1 OEM_CMD vt halt",
            "crate1 SENSOR 30:97 CU",
        ] {
            assert!(
                matches!(
                    registry.resolve_address(bad),
                    Err(CoreError::AddressSyntax { .. })
                ),
                "{bad}"
            );
        }
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn duplicate_ids_and_bad_configs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let (t, _m) = transport();
        assert!(registry.connect(config("crate1", dir.path()), t).await);

        let (t, _m) = transport();
        assert!(!registry.connect(config("crate1", dir.path()), t).await);
        let (t, _m) = transport();
        assert!(!registry.connect(config("crate 1", dir.path()), t).await);
        assert_eq!(registry.ids(), ["crate1"]);
        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn connect_in_flight_blocks_a_second_connect_with_the_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let reservation = registry.reserve("crate1").unwrap();

        let (t, mock) = transport();
        let err = registry
            .try_connect(config("crate1", dir.path()), t)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(mock.state().call_count("open_session"), 0);
        assert!(!dir.path().join("crate1.mch-1.cache").exists());

        drop(reservation);
        let (t, _m) = transport();
        assert!(registry.connect(config("crate1", dir.path()), t).await);
        assert!(registry.reserve("crate1").is_err());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_controller_is_registered_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let (t, mock) = transport();
        mock.state().reachable = false;

        assert!(registry.connect(config("crate1", dir.path()), t).await);
        let connection = registry.get("crate1").unwrap();
        assert!(!connection.catalog().is_initialized());
        assert!(registry.resolve_address("crate1 SENSOR 30:97 'CU TEMP1 '").is_err());
        assert!(!config("crate1", dir.path()).cache_path().exists());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn cache_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let registry = ConnectionRegistry::new();
        let (t, _m) = transport();
        let err = registry
            .try_connect(config("crate1", &blocker), t)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cache { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn schedule_reaches_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        let (t, mock) = transport();
        mock.state().readings.insert(
            (0x20, 0),
            Ok(ipmilink_api::SensorReading {
                raw: 25,
                ..ipmilink_api::SensorReading::default()
            }),
        );
        mock.state()
            .thresholds
            .insert((0x20, 0), ipmilink_api::SensorThresholds::default());
        mock.state()
            .hysteresis
            .insert((0x20, 0), ipmilink_api::SensorHysteresis::default());
        assert!(registry.connect(config("crate1", dir.path()), t).await);

        let address = registry
            .resolve_address("crate1 SENSOR 30:97 'CU TEMP1 '")
            .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(registry.schedule(&address, Entity::new(), move |e| {
            let _ = tx.send(e);
        }));
        let entity = rx.await.unwrap();
        assert_eq!(entity.double(crate::model::fields::VAL), Some(25.0));

        let other = Address::parse("crate9 SENSOR 1:1 'X'").unwrap();
        assert!(!registry.schedule(&other, Entity::new(), |_| {}));
        registry.shutdown().await;
        assert!(!registry.schedule(&address, Entity::new(), |_| {}));
    }
}
