//! Session-and-catalog engine between `ipmilink-api` transports and the
//! process-control host that owns records.
//!
//! - **[`ConnectionRegistry`]** — Explicitly constructed directory of
//!   connections. [`connect()`](ConnectionRegistry::connect) opens the
//!   session and the on-disk inventory cache, loads the catalog, and spawns
//!   the connection's worker. [`resolve_address()`](ConnectionRegistry::resolve_address)
//!   validates a record link against the catalog before anything is queued.
//!
//! - **[`ControllerSession`]** — One out-of-band session: keepalive when idle,
//!   reconnect after a cooldown, cache creation and staleness checks, sensor
//!   and LED reads, vendor command dispatch.
//!
//! - **[`InventoryCatalog`]** — Decoded SDR repository published as an
//!   immutable [`InventorySnapshot`] through `ArcSwap`. Sensors are keyed by
//!   `entityId:entityInstance:idString` and associated with their FRU.
//!
//! - **[`TaskExecutor`]** — Per-connection FIFO worker that drives a
//!   [`Provider`] and always completes each task's callback, writing
//!   `SEVR`/`STAT` on failure.
//!
//! - **[`Address`]** — Parsed `SENSOR`, `PICMG_LED` and `OEM_CMD` links.

pub mod address;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod provider;
pub mod registry;
pub mod sdr;
pub mod session;
pub mod vendor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use address::{Address, LedAddress, SensorAddress, VendorCommandAddress, sensor_key};
pub use cache::{CacheStatus, InventoryCache};
pub use catalog::{FruEntry, InventoryCatalog, InventorySnapshot, Staleness};
pub use config::{ConnectionConfig, Credentials, session_params};
pub use error::{CoreError, ErrorContext, SensorLabel};
pub use executor::{Callback, Task, TaskExecutor};
pub use model::{AlarmStatus, Entity, Severity, Value, fields};
pub use provider::{IpmiProvider, Provider};
pub use registry::{Connection, ConnectionRegistry};
pub use sdr::{
    DecodingParams, FruLocatorRecord, InventoryHeader, LedColor, LedRecord, SensorRecord,
};
pub use session::{ConnectionState, ControllerSession};
pub use vendor::{VendorCommandRegistry, VendorHandler};
