//! Per-table merge commands.
//!
//! A merge command knows how to copy one row of its table from one node to
//! another: the row is re-owned by the target node and every reference the
//! payload holds to the source node is re-rooted onto the target.
//!
//! Logical switch references are always re-rooted, since logical switches
//! are replicated to every member of an HA group under the same name.
//! Locator references are only re-rooted when they point at the source node;
//! a locator of some third node has no counterpart on the target, so it is
//! dropped and the copy is left partial until a later update completes it.

use sonic_ha_common::{
    LocatorRef, LogicalSwitchRef, McastMac, NodeId, Record, RecordData, RecordIdentity,
    RecordType, TerminationPoint, Tunnel, UcastMac,
};

/// Translation of one table's rows between node address spaces.
///
/// Implementations are stateless and pure: no I/O, no logging, and total
/// over every record (a record of another table is returned re-owned but
/// otherwise untouched).
pub trait MergeCommand: Send + Sync {
    /// The table this command handles.
    fn record_type(&self) -> RecordType;

    /// Human readable table description for logs.
    fn description(&self) -> &'static str;

    /// Copies `source` into the address space of `target`.
    fn transform(&self, target: &NodeId, source: &Record) -> Record;

    /// Identity the copy of `record` has on `target`.
    ///
    /// Derived only from the target node, the table and the record's natural
    /// key, so repeated calls agree and rows of different tables never collide.
    fn generate_identity(&self, target: &NodeId, record: &Record) -> RecordIdentity {
        record.identity_on(target)
    }
}

fn rebase_ls(target: &NodeId, r: &LogicalSwitchRef) -> LogicalSwitchRef {
    LogicalSwitchRef::new(target.clone(), r.name.clone())
}

fn rebase_locator(source: &NodeId, target: &NodeId, r: &LocatorRef) -> Option<LocatorRef> {
    (&r.node == source).then(|| LocatorRef {
        node: target.clone(),
        ..r.clone()
    })
}

fn rebase_ucast(source: &NodeId, target: &NodeId, m: &UcastMac) -> UcastMac {
    UcastMac {
        mac: m.mac,
        ip: m.ip,
        logical_switch: rebase_ls(target, &m.logical_switch),
        locator: m
            .locator
            .as_ref()
            .and_then(|l| rebase_locator(source, target, l)),
    }
}

fn rebase_mcast(source: &NodeId, target: &NodeId, m: &McastMac) -> McastMac {
    McastMac {
        mac: m.mac,
        logical_switch: rebase_ls(target, &m.logical_switch),
        locator_set: m
            .locator_set
            .iter()
            .filter_map(|l| rebase_locator(source, target, l))
            .collect(),
    }
}

fn reown(target: &NodeId, source: &Record, data: Option<RecordData>) -> Record {
    Record::new(target.clone(), data.unwrap_or_else(|| source.data.clone()))
}

/// Logical switches carry no node references.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalSwitchCmd;

impl MergeCommand for LogicalSwitchCmd {
    fn record_type(&self) -> RecordType {
        RecordType::LogicalSwitch
    }

    fn description(&self) -> &'static str {
        "LogicalSwitches"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        reown(target, source, None)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalUcastCmd;

impl MergeCommand for LocalUcastCmd {
    fn record_type(&self) -> RecordType {
        RecordType::LocalUcastMac
    }

    fn description(&self) -> &'static str {
        "LocalUcastMacs"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::LocalUcastMac(m) => Some(RecordData::LocalUcastMac(rebase_ucast(
                &source.owner,
                target,
                m,
            ))),
            _ => None,
        };
        reown(target, source, data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteUcastCmd;

impl MergeCommand for RemoteUcastCmd {
    fn record_type(&self) -> RecordType {
        RecordType::RemoteUcastMac
    }

    fn description(&self) -> &'static str {
        "RemoteUcastMacs"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::RemoteUcastMac(m) => Some(RecordData::RemoteUcastMac(rebase_ucast(
                &source.owner,
                target,
                m,
            ))),
            _ => None,
        };
        reown(target, source, data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMcastCmd;

impl MergeCommand for LocalMcastCmd {
    fn record_type(&self) -> RecordType {
        RecordType::LocalMcastMac
    }

    fn description(&self) -> &'static str {
        "LocalMcastMacs"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::LocalMcastMac(m) => Some(RecordData::LocalMcastMac(rebase_mcast(
                &source.owner,
                target,
                m,
            ))),
            _ => None,
        };
        reown(target, source, data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteMcastCmd;

impl MergeCommand for RemoteMcastCmd {
    fn record_type(&self) -> RecordType {
        RecordType::RemoteMcastMac
    }

    fn description(&self) -> &'static str {
        "RemoteMcastMacs"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::RemoteMcastMac(m) => Some(RecordData::RemoteMcastMac(rebase_mcast(
                &source.owner,
                target,
                m,
            ))),
            _ => None,
        };
        reown(target, source, data)
    }
}

/// Physical locators are keyed by encapsulation and IP only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicalLocatorCmd;

impl MergeCommand for PhysicalLocatorCmd {
    fn record_type(&self) -> RecordType {
        RecordType::PhysicalLocator
    }

    fn description(&self) -> &'static str {
        "PhysicalLocators"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        reown(target, source, None)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminationPointCmd;

impl MergeCommand for TerminationPointCmd {
    fn record_type(&self) -> RecordType {
        RecordType::TerminationPoint
    }

    fn description(&self) -> &'static str {
        "TerminationPoints"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::TerminationPoint(tp) => {
                Some(RecordData::TerminationPoint(TerminationPoint {
                    switch_name: tp.switch_name.clone(),
                    port_name: tp.port_name.clone(),
                    vlan_bindings: tp
                        .vlan_bindings
                        .iter()
                        .map(|(vlan, ls)| (*vlan, rebase_ls(target, ls)))
                        .collect(),
                }))
            }
            _ => None,
        };
        reown(target, source, data)
    }
}

/// Tunnel endpoints are part of the tunnel key, so both are always re-rooted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunnelCmd;

impl MergeCommand for TunnelCmd {
    fn record_type(&self) -> RecordType {
        RecordType::Tunnel
    }

    fn description(&self) -> &'static str {
        "Tunnels"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        let data = match &source.data {
            RecordData::Tunnel(t) => Some(RecordData::Tunnel(Tunnel {
                switch_name: t.switch_name.clone(),
                local: LocatorRef {
                    node: target.clone(),
                    ..t.local.clone()
                },
                remote: LocatorRef {
                    node: target.clone(),
                    ..t.remote.clone()
                },
                bfd_enabled: t.bfd_enabled,
            })),
            _ => None,
        };
        reown(target, source, data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TunnelIpCmd;

impl MergeCommand for TunnelIpCmd {
    fn record_type(&self) -> RecordType {
        RecordType::TunnelIp
    }

    fn description(&self) -> &'static str {
        "TunnelIps"
    }

    fn transform(&self, target: &NodeId, source: &Record) -> Record {
        reown(target, source, None)
    }
}

static LOGICAL_SWITCH_CMD: LogicalSwitchCmd = LogicalSwitchCmd;
static LOCAL_UCAST_CMD: LocalUcastCmd = LocalUcastCmd;
static REMOTE_UCAST_CMD: RemoteUcastCmd = RemoteUcastCmd;
static LOCAL_MCAST_CMD: LocalMcastCmd = LocalMcastCmd;
static REMOTE_MCAST_CMD: RemoteMcastCmd = RemoteMcastCmd;
static PHYSICAL_LOCATOR_CMD: PhysicalLocatorCmd = PhysicalLocatorCmd;
static TERMINATION_POINT_CMD: TerminationPointCmd = TerminationPointCmd;
static TUNNEL_CMD: TunnelCmd = TunnelCmd;
static TUNNEL_IP_CMD: TunnelIpCmd = TunnelIpCmd;

/// Returns the statically registered command for a table.
pub fn command_for(record_type: RecordType) -> &'static dyn MergeCommand {
    match record_type {
        RecordType::LogicalSwitch => &LOGICAL_SWITCH_CMD,
        RecordType::LocalUcastMac => &LOCAL_UCAST_CMD,
        RecordType::RemoteUcastMac => &REMOTE_UCAST_CMD,
        RecordType::LocalMcastMac => &LOCAL_MCAST_CMD,
        RecordType::RemoteMcastMac => &REMOTE_MCAST_CMD,
        RecordType::PhysicalLocator => &PHYSICAL_LOCATOR_CMD,
        RecordType::TerminationPoint => &TERMINATION_POINT_CMD,
        RecordType::Tunnel => &TUNNEL_CMD,
        RecordType::TunnelIp => &TUNNEL_IP_CMD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_ha_test::{
        locator_ref, logical_switch, node, one_of_each, remote_mcast, remote_ucast,
        termination_point, tunnel, CHILD_1, CHILD_2, HA_NODE,
    };

    #[test]
    fn test_registry_covers_every_type() {
        for ty in RecordType::ALL {
            assert_eq!(command_for(ty).record_type(), ty);
        }
    }

    #[test]
    fn test_transform_reowns_and_keeps_key() {
        let target = node(CHILD_1);
        for rec in one_of_each(HA_NODE) {
            let cmd = command_for(rec.record_type());
            let copy = cmd.transform(&target, &rec);
            assert_eq!(copy.owner, target);
            assert_eq!(copy.natural_key(), rec.natural_key());
            assert_eq!(cmd.generate_identity(&target, &rec), copy.identity());
        }
    }

    #[test]
    fn test_ucast_references_rerooted() {
        let src = remote_ucast(HA_NODE, "ls0", "00:11:22:33:44:55", "10.0.0.9");
        let copy = command_for(RecordType::RemoteUcastMac).transform(&node(CHILD_1), &src);

        assert_eq!(
            copy,
            remote_ucast(CHILD_1, "ls0", "00:11:22:33:44:55", "10.0.0.9")
        );
    }

    #[test]
    fn test_foreign_locator_left_unresolved() {
        let mut src = remote_ucast(HA_NODE, "ls0", "00:11:22:33:44:55", "10.0.0.9");
        if let RecordData::RemoteUcastMac(m) = &mut src.data {
            m.locator = Some(locator_ref(CHILD_2, "10.0.0.9"));
        }

        let copy = command_for(RecordType::RemoteUcastMac).transform(&node(CHILD_1), &src);
        match copy.data {
            RecordData::RemoteUcastMac(m) => {
                assert!(m.locator.is_none());
                assert_eq!(m.logical_switch.node, node(CHILD_1));
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_mcast_locator_set_filters_foreign_members() {
        let mut src = remote_mcast(HA_NODE, "ls0", "unknown-dst", &["10.0.0.1", "10.0.0.2"]);
        if let RecordData::RemoteMcastMac(m) = &mut src.data {
            m.locator_set.push(locator_ref(CHILD_2, "10.0.0.3"));
        }

        let copy = command_for(RecordType::RemoteMcastMac).transform(&node(CHILD_1), &src);
        assert_eq!(
            copy,
            remote_mcast(CHILD_1, "ls0", "unknown-dst", &["10.0.0.1", "10.0.0.2"])
        );
    }

    #[test]
    fn test_termination_point_and_tunnel() {
        let tp = termination_point(HA_NODE, "sw1", "Ethernet4", &[(100, "ls0"), (200, "ls1")]);
        assert_eq!(
            command_for(RecordType::TerminationPoint).transform(&node(CHILD_1), &tp),
            termination_point(CHILD_1, "sw1", "Ethernet4", &[(100, "ls0"), (200, "ls1")])
        );

        let t = tunnel(CHILD_1, "sw1", "10.0.0.1", "10.0.0.2");
        assert_eq!(
            command_for(RecordType::Tunnel).transform(&node(HA_NODE), &t),
            tunnel(HA_NODE, "sw1", "10.0.0.1", "10.0.0.2")
        );
    }

    #[test]
    fn test_generate_identity_is_injective_across_targets_and_types() {
        let ls = logical_switch(HA_NODE, "ls0", 100);
        let cmd = command_for(RecordType::LogicalSwitch);

        let a = cmd.generate_identity(&node(CHILD_1), &ls);
        let b = cmd.generate_identity(&node(CHILD_2), &ls);
        assert_ne!(a, b);
        assert_eq!(a, cmd.generate_identity(&node(CHILD_1), &ls));

        let tip = sonic_ha_test::tunnel_ip(HA_NODE, "ls0", "10.0.0.1");
        assert_ne!(
            a,
            command_for(RecordType::TunnelIp).generate_identity(&node(CHILD_1), &tip)
        );
    }

    #[test]
    fn test_wrong_table_is_reowned_unchanged() {
        let ls = logical_switch(HA_NODE, "ls0", 100);
        let copy = command_for(RecordType::Tunnel).transform(&node(CHILD_1), &ls);
        assert_eq!(copy.owner, node(CHILD_1));
        assert_eq!(copy.data, ls.data);
    }
}
