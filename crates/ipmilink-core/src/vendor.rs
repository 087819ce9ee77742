// ── Vendor (OEM) commands ──
//
// Registry of vendor-specific requests keyed by a set of vendor aliases
// and a command name. Lookup scans the alias sets in registration order,
// then matches the command name exactly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use ipmilink_api::IpmiTransport;

use crate::error::CoreError;
use crate::model::Entity;

/// A vendor command handler: sends its request over the open session,
/// using the lowercase link arguments and the caller's result bag.
pub type VendorHandler = Arc<
    dyn for<'a> Fn(
            &'a mut dyn IpmiTransport,
            &'a [String],
            &'a Entity,
        ) -> BoxFuture<'a, Result<(), CoreError>>
        + Send
        + Sync,
>;

struct VendorEntry {
    aliases: Vec<String>,
    commands: HashMap<String, VendorHandler>,
}

pub struct VendorCommandRegistry {
    vendors: Vec<VendorEntry>,
}

impl fmt::Debug for VendorCommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for vendor in &self.vendors {
            let mut commands: Vec<&str> = vendor.commands.keys().map(String::as_str).collect();
            commands.sort_unstable();
            list.entry(&(&vendor.aliases, commands));
        }
        list.finish()
    }
}

impl Default for VendorCommandRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VendorCommandRegistry {
    /// A registry with no vendors.
    pub fn empty() -> Self {
        Self {
            vendors: Vec::new(),
        }
    }

    /// The vendors ipmilink ships handlers for.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        vadatech::register(&mut registry);
        registry
    }

    /// Register a vendor under `aliases` with its command table.
    pub fn register(
        &mut self,
        aliases: &[&str],
        commands: impl IntoIterator<Item = (&'static str, VendorHandler)>,
    ) {
        self.vendors.push(VendorEntry {
            aliases: aliases.iter().map(|a| a.to_ascii_lowercase()).collect(),
            commands: commands
                .into_iter()
                .map(|(name, handler)| (name.to_owned(), handler))
                .collect(),
        });
    }

    pub fn find(&self, vendor: &str, command: &str) -> Option<&VendorHandler> {
        self.vendors
            .iter()
            .find(|entry| entry.aliases.iter().any(|alias| alias == vendor))
            .and_then(|entry| entry.commands.get(command))
    }

    pub fn is_valid(&self, vendor: &str, command: &str) -> bool {
        self.find(vendor, command).is_some()
    }
}

// ── VadaTech ────────────────────────────────────────────────────────

mod vadatech {
    use std::sync::Arc;

    use futures_util::future::BoxFuture;
    use ipmilink_api::types::{COMPLETION_OK, net_fn};
    use ipmilink_api::{IpmbTarget, IpmiTransport};
    use tracing::{debug, info};

    use super::VendorCommandRegistry;
    use crate::error::CoreError;
    use crate::model::{Entity, fields};

    const ALIASES: &[&str] = &["vadatech", "vt"];

    /// OEM "Set Chassis Power State".
    const SET_CHASSIS_POWER_STATE: u8 = 0x9E;
    /// MCH slave address on the primary IPMB.
    const IPMB_ADDRESS: u8 = 0x82;

    const SITE_TYPES: &[(&str, u8)] = &[("mch", 0x0A), ("amc", 0x07), ("cu", 0x04), ("pm", 0x0B)];

    pub(super) fn register(registry: &mut VendorCommandRegistry) {
        registry.register(
            ALIASES,
            [
                ("set-power-state", Arc::new(set_power_state) as super::VendorHandler),
                ("reboot", Arc::new(reboot) as super::VendorHandler),
            ],
        );
    }

    fn target() -> IpmbTarget {
        IpmbTarget::new(
            IpmbTarget::CHANNEL_PRIMARY_IPMB,
            IPMB_ADDRESS,
            IpmbTarget::LUN_BMC,
        )
    }

    fn required_val(entity: &Entity, command: &str) -> Result<i64, CoreError> {
        entity.int(fields::VAL).ok_or_else(|| {
            CoreError::protocol(format!("{command}: the record supplied no VAL field"))
        })
    }

    /// `set-power-state <site-type> <site-number>` with VAL as the state.
    fn set_power_state<'a>(
        transport: &'a mut dyn IpmiTransport,
        args: &'a [String],
        entity: &'a Entity,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let [site_type, site_number, ..] = args else {
                return Err(CoreError::protocol(
                    "set-power-state needs a site type (mch, amc, cu, pm) and a site number",
                ));
            };
            let val = required_val(entity, "set-power-state")?;
            let state = val.to_le_bytes()[0];
            let site = SITE_TYPES
                .iter()
                .find(|(name, _)| *name == site_type.as_str())
                .map(|(_, code)| *code)
                .ok_or_else(|| {
                    CoreError::protocol(format!("set-power-state: invalid site type '{site_type}'"))
                })?;
            let number: u8 = site_number.parse().map_err(|_| {
                CoreError::protocol(format!(
                    "set-power-state: invalid site number '{site_number}'"
                ))
            })?;

            let request = [SET_CHASSIS_POWER_STATE, state, site, number];
            let response = transport
                .raw(target(), net_fn::OEM_GROUP_RQ, &request)
                .await?;

            match response.as_ref() {
                [SET_CHASSIS_POWER_STATE, COMPLETION_OK] => {
                    info!(site_type = %site_type, site_number = number, state, "power state set");
                    Ok(())
                }
                [SET_CHASSIS_POWER_STATE, cc] => Err(CoreError::protocol(format!(
                    "set-power-state returned completion code {cc:#04x}"
                ))),
                other => Err(CoreError::protocol(format!(
                    "set-power-state returned unexpected response {other:02x?}"
                ))),
            }
        })
    }

    /// `reboot` the whole chassis when VAL, taken as a byte, is at least 1.
    fn reboot<'a>(
        transport: &'a mut dyn IpmiTransport,
        _args: &'a [String],
        entity: &'a Entity,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            if required_val(entity, "reboot")?.to_le_bytes()[0] < 1 {
                return Ok(());
            }
            let request = [SET_CHASSIS_POWER_STATE, 0x00, 0xFF, 0xFF];
            // The controller resets before it answers.
            if let Err(e) = transport.raw(target(), net_fn::OEM_GROUP_RQ, &request).await {
                debug!(error = %e, "no reply to chassis reboot");
            }
            info!("chassis reboot requested");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;
    use ipmilink_api::mock::{MockHandle, MockTransport};
    use ipmilink_api::{IpmbTarget, SessionParams};

    use super::*;
    use crate::model::fields;

    async fn open() -> (MockTransport, MockHandle) {
        let (mut transport, handle) = MockTransport::new();
        transport
            .open_session(&SessionParams::new("mch"))
            .await
            .unwrap();
        (transport, handle)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn lookup_by_any_alias_then_exact_command() {
        let registry = VendorCommandRegistry::builtin();
        assert!(registry.is_valid("vadatech", "reboot"));
        assert!(registry.is_valid("vt", "set-power-state"));
        assert!(!registry.is_valid("vt", "set_power_state"));
        assert!(!registry.is_valid("acme", "reboot"));
        assert!(!registry.is_valid("vt", "Reboot"));
    }

    fn noop<'a>(
        _: &'a mut dyn IpmiTransport,
        _: &'a [String],
        _: &'a Entity,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn first_matching_alias_set_wins() {
        let mut registry = VendorCommandRegistry::empty();
        let noop: VendorHandler = Arc::new(noop);
        registry.register(&["acme"], [("a", noop.clone())]);
        registry.register(&["acme"], [("b", noop)]);
        assert!(registry.is_valid("acme", "a"));
        assert!(!registry.is_valid("acme", "b"));
    }

    #[tokio::test]
    async fn set_power_state_sends_oem_request() {
        let (mut transport, handle) = open().await;
        let registry = VendorCommandRegistry::builtin();
        let handler = registry.find("vt", "set-power-state").unwrap();
        let entity = Entity::new().with(fields::VAL, 1_i64);

        handler(&mut transport, &args(&["amc", "3"]), &entity)
            .await
            .unwrap();

        let state = handle.state();
        let sent = state.raw_requests.last().unwrap();
        assert_eq!(sent.target, IpmbTarget::new(0, 0x82, 0));
        assert_eq!(sent.net_fn, 0x2E);
        assert_eq!(sent.data, vec![0x9E, 1, 0x07, 3]);
    }

    #[tokio::test]
    async fn set_power_state_checks_reply_and_arguments() {
        let (mut transport, handle) = open().await;
        let registry = VendorCommandRegistry::builtin();
        let handler = registry.find("vt", "set-power-state").unwrap();
        let entity = Entity::new().with(fields::VAL, 0_i64);

        handle
            .state()
            .raw_responses
            .push_back(Ok(Bytes::from_static(&[0x9E, 0xC1])));
        let err = handler(&mut transport, &args(&["mch", "1"]), &entity)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0xc1"));

        assert!(
            handler(&mut transport, &args(&["amc"]), &entity)
                .await
                .is_err()
        );
        assert!(
            handler(&mut transport, &args(&["rtm", "1"]), &entity)
                .await
                .is_err()
        );
        assert!(
            handler(&mut transport, &args(&["amc", "1"]), &Entity::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn reboot_only_when_val_is_set() {
        let (mut transport, handle) = open().await;
        let registry = VendorCommandRegistry::builtin();
        let handler = registry.find("vadatech", "reboot").unwrap();

        let idle = Entity::new().with(fields::VAL, 0_i64);
        handler(&mut transport, &[], &idle).await.unwrap();
        assert!(handle.state().raw_requests.is_empty());

        handle
            .state()
            .raw_responses
            .push_back(Err(ipmilink_api::Error::Timeout { timeout_ms: 1000 }));
        let go = Entity::new().with(fields::VAL, 1_i64);
        handler(&mut transport, &[], &go).await.unwrap();
        assert_eq!(
            handle.state().raw_requests[0].data,
            vec![0x9E, 0x00, 0xFF, 0xFF]
        );
    }

    #[tokio::test]
    async fn reboot_reads_val_as_a_byte() {
        let (mut transport, handle) = open().await;
        let registry = VendorCommandRegistry::builtin();
        let handler = registry.find("vt", "reboot").unwrap();

        let wrapped = Entity::new().with(fields::VAL, 256_i64);
        handler(&mut transport, &[], &wrapped).await.unwrap();
        assert!(handle.state().raw_requests.is_empty());

        let negative = Entity::new().with(fields::VAL, -1_i64);
        handler(&mut transport, &[], &negative).await.unwrap();
        assert_eq!(handle.state().raw_requests.len(), 1);
    }
}
