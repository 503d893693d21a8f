//! Record fixtures for every replicated table
//!
//! Every builder takes the owning node as a string and points all embedded
//! references at that same node, which is what a device or controller would
//! populate for its own rows.

use std::collections::BTreeMap;
use std::net::IpAddr;

use sonic_ha_common::{
    Encapsulation, LocatorRef, LogicalSwitch, LogicalSwitchRef, McastMac, McastMacAddress,
    NodeId, PhysicalLocator, Record, RecordData, ReplicationMode, TerminationPoint, Tunnel,
    TunnelIp, UcastMac,
};

/// Aggregate node used by most scenarios.
pub const HA_NODE: &str = "hwvtep://uuid/ha-1";
/// First physical child.
pub const CHILD_1: &str = "hwvtep://uuid/c1";
/// Second physical child.
pub const CHILD_2: &str = "hwvtep://uuid/c2";
/// Third physical child.
pub const CHILD_3: &str = "hwvtep://uuid/c3";

pub fn node(id: &str) -> NodeId {
    NodeId::new(id)
}

fn ip(addr: &str) -> IpAddr {
    addr.parse().expect("fixture IP address")
}

fn ls_ref(owner: &str, ls: &str) -> LogicalSwitchRef {
    LogicalSwitchRef::new(node(owner), ls)
}

pub fn locator_ref(owner: &str, dst_ip: &str) -> LocatorRef {
    LocatorRef::vxlan(node(owner), ip(dst_ip))
}

pub fn logical_switch(owner: &str, name: &str, vni: u32) -> Record {
    Record::new(
        node(owner),
        RecordData::LogicalSwitch(LogicalSwitch {
            name: name.to_string(),
            tunnel_key: Some(vni),
            description: Some(format!("{name} vni {vni}")),
            replication_mode: Some(ReplicationMode::SourceNode),
        }),
    )
}

fn ucast(owner: &str, ls: &str, mac: &str, locator_ip: Option<&str>) -> UcastMac {
    UcastMac {
        mac: mac.parse().expect("fixture MAC address"),
        ip: None,
        logical_switch: ls_ref(owner, ls),
        locator: locator_ip.map(|l| locator_ref(owner, l)),
    }
}

pub fn local_ucast(owner: &str, ls: &str, mac: &str, locator_ip: &str) -> Record {
    Record::new(
        node(owner),
        RecordData::LocalUcastMac(ucast(owner, ls, mac, Some(locator_ip))),
    )
}

pub fn remote_ucast(owner: &str, ls: &str, mac: &str, locator_ip: &str) -> Record {
    Record::new(
        node(owner),
        RecordData::RemoteUcastMac(ucast(owner, ls, mac, Some(locator_ip))),
    )
}

fn mcast(owner: &str, ls: &str, mac: &str, locator_ips: &[&str]) -> McastMac {
    McastMac {
        mac: mac.parse::<McastMacAddress>().expect("fixture multicast MAC"),
        logical_switch: ls_ref(owner, ls),
        locator_set: locator_ips.iter().map(|l| locator_ref(owner, l)).collect(),
    }
}

pub fn local_mcast(owner: &str, ls: &str, mac: &str, locator_ips: &[&str]) -> Record {
    Record::new(
        node(owner),
        RecordData::LocalMcastMac(mcast(owner, ls, mac, locator_ips)),
    )
}

pub fn remote_mcast(owner: &str, ls: &str, mac: &str, locator_ips: &[&str]) -> Record {
    Record::new(
        node(owner),
        RecordData::RemoteMcastMac(mcast(owner, ls, mac, locator_ips)),
    )
}

pub fn physical_locator(owner: &str, dst_ip: &str) -> Record {
    let dst_ip = ip(dst_ip);
    Record::new(
        node(owner),
        RecordData::PhysicalLocator(PhysicalLocator {
            encapsulation: Encapsulation::for_ip(&dst_ip),
            dst_ip,
        }),
    )
}

pub fn termination_point(owner: &str, switch: &str, port: &str, bindings: &[(u16, &str)]) -> Record {
    Record::new(
        node(owner),
        RecordData::TerminationPoint(TerminationPoint {
            switch_name: switch.to_string(),
            port_name: port.to_string(),
            vlan_bindings: bindings
                .iter()
                .map(|(vlan, ls)| (*vlan, ls_ref(owner, ls)))
                .collect::<BTreeMap<_, _>>(),
        }),
    )
}

pub fn tunnel(owner: &str, switch: &str, local_ip: &str, remote_ip: &str) -> Record {
    Record::new(
        node(owner),
        RecordData::Tunnel(Tunnel {
            switch_name: switch.to_string(),
            local: locator_ref(owner, local_ip),
            remote: locator_ref(owner, remote_ip),
            bfd_enabled: true,
        }),
    )
}

pub fn tunnel_ip(owner: &str, switch: &str, addr: &str) -> Record {
    Record::new(
        node(owner),
        RecordData::TunnelIp(TunnelIp {
            switch_name: switch.to_string(),
            ip: ip(addr),
        }),
    )
}

/// One record of every table, owned by `owner`.
pub fn one_of_each(owner: &str) -> Vec<Record> {
    vec![
        logical_switch(owner, "ls0", 5000),
        local_ucast(owner, "ls0", "00:00:00:00:00:01", "10.0.0.1"),
        remote_ucast(owner, "ls0", "00:00:00:00:00:02", "10.0.0.2"),
        local_mcast(owner, "ls0", "unknown-dst", &["10.0.0.1"]),
        remote_mcast(owner, "ls0", "unknown-dst", &["10.0.0.2", "10.0.0.3"]),
        physical_locator(owner, "10.0.0.2"),
        termination_point(owner, "sw1", "Ethernet0", &[(100, "ls0")]),
        tunnel(owner, "sw1", "10.0.0.1", "10.0.0.2"),
        tunnel_ip(owner, "sw1", "10.0.0.1"),
    ]
}
