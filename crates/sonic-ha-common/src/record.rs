//! Replicated HWVTEP records.
//!
//! A [`Record`] is one row of one of the hardware VTEP tables, owned by a
//! node and living in either the intended or the observed partition. The
//! payload types carry references to other rows ([`LogicalSwitchRef`],
//! [`LocatorRef`]) which name the node they belong to; these are what the
//! merge commands re-root when copying a record between nodes.

use crate::{MacAddress, NodeId, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Store partition a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    /// Desired configuration (CONFIG datastore).
    Intended,
    /// Live device state (OPERATIONAL datastore).
    Observed,
}

impl Partition {
    /// Both partitions.
    pub const ALL: [Partition; 2] = [Partition::Intended, Partition::Observed];

    /// Returns the datastore name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Intended => "CONFIG",
            Partition::Observed => "OPERATIONAL",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of replicated HWVTEP tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    LogicalSwitch,
    LocalUcastMac,
    RemoteUcastMac,
    LocalMcastMac,
    RemoteMcastMac,
    PhysicalLocator,
    TerminationPoint,
    Tunnel,
    TunnelIp,
}

impl RecordType {
    /// Every record type, in registration order.
    pub const ALL: [RecordType; 9] = [
        RecordType::LogicalSwitch,
        RecordType::LocalUcastMac,
        RecordType::RemoteUcastMac,
        RecordType::LocalMcastMac,
        RecordType::RemoteMcastMac,
        RecordType::PhysicalLocator,
        RecordType::TerminationPoint,
        RecordType::Tunnel,
        RecordType::TunnelIp,
    ];

    /// Returns the table name used in identities and logs.
    pub fn table_name(&self) -> &'static str {
        match self {
            RecordType::LogicalSwitch => "logical_switches",
            RecordType::LocalUcastMac => "local_ucast_macs",
            RecordType::RemoteUcastMac => "remote_ucast_macs",
            RecordType::LocalMcastMac => "local_mcast_macs",
            RecordType::RemoteMcastMac => "remote_mcast_macs",
            RecordType::PhysicalLocator => "physical_locators",
            RecordType::TerminationPoint => "termination_points",
            RecordType::Tunnel => "tunnels",
            RecordType::TunnelIp => "tunnel_ips",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for RecordType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordType::ALL
            .into_iter()
            .find(|t| t.table_name() == s)
            .ok_or_else(|| ParseError::InvalidRecordType(s.to_string()))
    }
}

/// Tunnel encapsulation of a physical locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Encapsulation {
    VxlanOverIpv4,
    VxlanOverIpv6,
}

impl Encapsulation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encapsulation::VxlanOverIpv4 => "vxlan_over_ipv4",
            Encapsulation::VxlanOverIpv6 => "vxlan_over_ipv6",
        }
    }

    /// Returns the encapsulation matching the address family of `ip`.
    pub fn for_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Encapsulation::VxlanOverIpv4,
            IpAddr::V6(_) => Encapsulation::VxlanOverIpv6,
        }
    }
}

/// BUM replication mode of a logical switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicationMode {
    ServiceNode,
    SourceNode,
}

/// Reference to a logical switch row on a given node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalSwitchRef {
    pub node: NodeId,
    pub name: String,
}

impl LogicalSwitchRef {
    pub fn new(node: NodeId, name: impl Into<String>) -> Self {
        Self {
            node,
            name: name.into(),
        }
    }
}

/// Reference to a physical locator (tunnel endpoint) row on a given node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocatorRef {
    pub node: NodeId,
    pub encapsulation: Encapsulation,
    pub dst_ip: IpAddr,
}

impl LocatorRef {
    /// Creates a VXLAN locator reference, picking the encapsulation from `dst_ip`.
    pub fn vxlan(node: NodeId, dst_ip: IpAddr) -> Self {
        Self {
            node,
            encapsulation: Encapsulation::for_ip(&dst_ip),
            dst_ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitch {
    pub name: String,
    /// VXLAN network identifier.
    pub tunnel_key: Option<u32>,
    pub description: Option<String>,
    pub replication_mode: Option<ReplicationMode>,
}

/// Unicast MAC entry (local or remote table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UcastMac {
    pub mac: MacAddress,
    pub ip: Option<IpAddr>,
    pub logical_switch: LogicalSwitchRef,
    /// `None` while the locator has no counterpart on the owning node.
    pub locator: Option<LocatorRef>,
}

/// Destination of a multicast MAC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McastMacAddress {
    /// The `unknown-dst` flood entry.
    UnknownDst,
    Mac(MacAddress),
}

impl fmt::Display for McastMacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McastMacAddress::UnknownDst => f.write_str("unknown-dst"),
            McastMacAddress::Mac(mac) => write!(f, "{mac}"),
        }
    }
}

impl FromStr for McastMacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "unknown-dst" {
            Ok(McastMacAddress::UnknownDst)
        } else {
            s.parse().map(McastMacAddress::Mac)
        }
    }
}

/// Multicast MAC entry (local or remote table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McastMac {
    pub mac: McastMacAddress,
    pub logical_switch: LogicalSwitchRef,
    pub locator_set: Vec<LocatorRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLocator {
    pub encapsulation: Encapsulation,
    pub dst_ip: IpAddr,
}

/// Port of a physical switch with its VLAN to logical switch bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationPoint {
    pub switch_name: String,
    pub port_name: String,
    pub vlan_bindings: BTreeMap<u16, LogicalSwitchRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    pub switch_name: String,
    pub local: LocatorRef,
    pub remote: LocatorRef,
    pub bfd_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelIp {
    pub switch_name: String,
    pub ip: IpAddr,
}

/// Typed payload of a record; the variant determines the [`RecordType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordData {
    LogicalSwitch(LogicalSwitch),
    LocalUcastMac(UcastMac),
    RemoteUcastMac(UcastMac),
    LocalMcastMac(McastMac),
    RemoteMcastMac(McastMac),
    PhysicalLocator(PhysicalLocator),
    TerminationPoint(TerminationPoint),
    Tunnel(Tunnel),
    TunnelIp(TunnelIp),
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::LogicalSwitch(_) => RecordType::LogicalSwitch,
            RecordData::LocalUcastMac(_) => RecordType::LocalUcastMac,
            RecordData::RemoteUcastMac(_) => RecordType::RemoteUcastMac,
            RecordData::LocalMcastMac(_) => RecordType::LocalMcastMac,
            RecordData::RemoteMcastMac(_) => RecordType::RemoteMcastMac,
            RecordData::PhysicalLocator(_) => RecordType::PhysicalLocator,
            RecordData::TerminationPoint(_) => RecordType::TerminationPoint,
            RecordData::Tunnel(_) => RecordType::Tunnel,
            RecordData::TunnelIp(_) => RecordType::TunnelIp,
        }
    }

    /// Returns the natural key of the row, independent of its owning node.
    ///
    /// Free-form name segments are escaped so that keys stay unambiguous
    /// when names contain the `/` separator.
    pub fn natural_key(&self) -> String {
        match self {
            RecordData::LogicalSwitch(ls) => escape_segment(&ls.name),
            RecordData::LocalUcastMac(m) | RecordData::RemoteUcastMac(m) => {
                format!("{}/{}", escape_segment(&m.logical_switch.name), m.mac)
            }
            RecordData::LocalMcastMac(m) | RecordData::RemoteMcastMac(m) => {
                format!("{}/{}", escape_segment(&m.logical_switch.name), m.mac)
            }
            RecordData::PhysicalLocator(pl) => {
                format!("{}/{}", pl.encapsulation.as_str(), pl.dst_ip)
            }
            RecordData::TerminationPoint(tp) => format!(
                "{}/{}",
                escape_segment(&tp.switch_name),
                escape_segment(&tp.port_name)
            ),
            RecordData::Tunnel(t) => format!(
                "{}/{}/{}",
                escape_segment(&t.switch_name),
                t.local.dst_ip,
                t.remote.dst_ip
            ),
            RecordData::TunnelIp(t) => format!("{}/{}", escape_segment(&t.switch_name), t.ip),
        }
    }
}

pub(crate) fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

/// Identity of a record: owning node, table and natural key.
///
/// Displays as `node/table/key` with the node segment escaped, so the
/// string form is unique per identity and usable as a scheduler key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub node: NodeId,
    pub record_type: RecordType,
    pub key: String,
}

impl RecordIdentity {
    pub fn new(node: NodeId, record_type: RecordType, key: impl Into<String>) -> Self {
        Self {
            node,
            record_type,
            key: key.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.node.escaped(),
            self.record_type,
            self.key
        )
    }
}

/// One row of a replicated table, owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub owner: NodeId,
    pub data: RecordData,
}

impl Record {
    pub fn new(owner: NodeId, data: RecordData) -> Self {
        Self { owner, data }
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    pub fn natural_key(&self) -> String {
        self.data.natural_key()
    }

    /// Identity of this record on its own node.
    pub fn identity(&self) -> RecordIdentity {
        self.identity_on(&self.owner)
    }

    /// Identity this record would have if it were owned by `node`.
    pub fn identity_on(&self, node: &NodeId) -> RecordIdentity {
        RecordIdentity::new(node.clone(), self.record_type(), self.natural_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(id: &str) -> NodeId {
        NodeId::new(id)
    }

    fn ucast(owner: &str, ls: &str, mac: &str) -> Record {
        Record::new(
            node(owner),
            RecordData::RemoteUcastMac(UcastMac {
                mac: mac.parse().unwrap(),
                ip: None,
                logical_switch: LogicalSwitchRef::new(node(owner), ls),
                locator: None,
            }),
        )
    }

    #[test]
    fn test_record_type_names_roundtrip() {
        for t in RecordType::ALL {
            assert_eq!(t.table_name().parse::<RecordType>().unwrap(), t);
        }
        assert!("bogus".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_identity_display() {
        let rec = ucast("hwvtep://uuid/a", "ls0", "00:11:22:33:44:55");
        assert_eq!(
            rec.identity().to_string(),
            "hwvtep:%2F%2Fuuid%2Fa/remote_ucast_macs/ls0/00:11:22:33:44:55"
        );
    }

    #[test]
    fn test_identity_display_unique_across_node_names() {
        // unescaped, both read "n/logical_switches/logical_switches/ls0"
        let a = RecordIdentity::new(node("n/logical_switches"), RecordType::LogicalSwitch, "ls0");
        let b = RecordIdentity::new(
            node("n"),
            RecordType::LogicalSwitch,
            "logical_switches/ls0",
        );
        assert_ne!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "n%2Flogical_switches/logical_switches/ls0");
        assert_eq!(b.to_string(), "n/logical_switches/logical_switches/ls0");
    }

    #[test]
    fn test_identity_on_other_node_keeps_key() {
        let rec = ucast("a", "ls0", "00:11:22:33:44:55");
        let id = rec.identity_on(&node("c1"));
        assert_eq!(id.node, node("c1"));
        assert_eq!(id.key, rec.natural_key());
        assert_eq!(id.record_type, RecordType::RemoteUcastMac);
    }

    #[test]
    fn test_natural_key_escapes_separator() {
        let a = Record::new(
            node("a"),
            RecordData::TerminationPoint(TerminationPoint {
                switch_name: "sw/1".to_string(),
                port_name: "p".to_string(),
                vlan_bindings: BTreeMap::new(),
            }),
        );
        let b = Record::new(
            node("a"),
            RecordData::TerminationPoint(TerminationPoint {
                switch_name: "sw".to_string(),
                port_name: "1/p".to_string(),
                vlan_bindings: BTreeMap::new(),
            }),
        );
        assert_ne!(a.natural_key(), b.natural_key());
        assert_eq!(a.natural_key(), "sw%2F1/p");
    }

    #[test]
    fn test_mcast_unknown_dst() {
        let dst: McastMacAddress = "unknown-dst".parse().unwrap();
        assert_eq!(dst, McastMacAddress::UnknownDst);
        assert_eq!(dst.to_string(), "unknown-dst");

        let mac: McastMacAddress = "01:00:5e:01:01:01".parse().unwrap();
        assert!(matches!(mac, McastMacAddress::Mac(_)));
    }

    #[test]
    fn test_locator_encapsulation_follows_family() {
        let v4 = LocatorRef::vxlan(node("a"), "10.0.0.1".parse().unwrap());
        assert_eq!(v4.encapsulation, Encapsulation::VxlanOverIpv4);
        let v6 = LocatorRef::vxlan(node("a"), "fd00::1".parse().unwrap());
        assert_eq!(v6.encapsulation, Encapsulation::VxlanOverIpv6);
    }
}
