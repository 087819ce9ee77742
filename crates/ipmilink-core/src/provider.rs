// ── Provider facade ──
//
// What a connection worker needs from a backend: current values for
// sensor and LED addresses, vendor command dispatch, and periodic
// maintenance. The worker owns its provider outright, so every method
// takes `&mut self` and no locking happens below this seam.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::address::{Address, VendorCommandAddress};
use crate::catalog::InventoryCatalog;
use crate::error::CoreError;
use crate::model::Entity;
use crate::session::ControllerSession;

#[async_trait]
pub trait Provider: Send {
    /// Read the current value of a sensor or LED address.
    async fn entity_value(&mut self, address: &Address) -> Result<Entity, CoreError>;

    /// Run a vendor command with the caller's fields as input.
    async fn dispatch_vendor_command(
        &mut self,
        address: &VendorCommandAddress,
        entity: &Entity,
    ) -> Result<(), CoreError>;

    /// Keepalive, reconnect and catalog staleness checks. Never fails;
    /// problems are logged and retried on the next call.
    async fn process(&mut self);
}

// ── IPMI ────────────────────────────────────────────────────────────

/// The IPMI backend: one controller session and its catalog.
#[derive(Debug)]
pub struct IpmiProvider {
    session: ControllerSession,
    catalog: Arc<InventoryCatalog>,
}

impl IpmiProvider {
    pub fn new(session: ControllerSession, catalog: Arc<InventoryCatalog>) -> Self {
        Self { session, catalog }
    }

    pub fn session(&self) -> &ControllerSession {
        &self.session
    }

    pub fn catalog(&self) -> &Arc<InventoryCatalog> {
        &self.catalog
    }
}

#[async_trait]
impl Provider for IpmiProvider {
    async fn entity_value(&mut self, address: &Address) -> Result<Entity, CoreError> {
        match address {
            Address::Sensor(sensor) => {
                let record = self.catalog.find_sensor(&sensor.key()).ok_or_else(|| {
                    CoreError::address(&address.to_string(), "sensor is no longer in the catalog")
                })?;
                self.session.read_sensor(&record).await
            }
            Address::Led(led) => {
                let record = self
                    .catalog
                    .find_led(led.fru_slave_address, led.led_id)
                    .ok_or_else(|| {
                        CoreError::address(&address.to_string(), "LED is no longer in the catalog")
                    })?;
                self.session.read_led(&record).await
            }
            Address::VendorCommand(_) => Err(CoreError::Internal(format!(
                "'{address}' has no value to read"
            ))),
        }
    }

    async fn dispatch_vendor_command(
        &mut self,
        address: &VendorCommandAddress,
        entity: &Entity,
    ) -> Result<(), CoreError> {
        self.session.dispatch_vendor_command(address, entity).await
    }

    async fn process(&mut self) {
        self.session.process().await;
        if let Err(e) = self.catalog.process(&mut self.session).await {
            warn!(connection = %self.session.id(), error = %e, "catalog maintenance failed");
        }
    }
}
