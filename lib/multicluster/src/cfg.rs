// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use crate::api::ClusterCfg;
use crate::api::GLOBAL_VIRTUAL_MAC;
use crate::api::IpAddr;
use crate::api::IpCidr;
use crate::api::IpProto;
use crate::api::MacAddr;
use ofpipe::ct::CtZones;
use ofpipe::ct::ZoneError;
use ofpipe::ct::ZoneMap;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

fn default_virtual_mac() -> MacAddr {
    GLOBAL_VIRTUAL_MAC
}

fn default_ip_protocols() -> Vec<IpProto> {
    vec![IpProto::Ipv4]
}

/// The configuration of the Multicluster feature, fixed at startup.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MulticlusterCfg {
    /// The destination MAC marking cross-cluster tunnel traffic.
    ///
    /// Every member of a cluster set must agree on this value.
    #[serde(default = "default_virtual_mac")]
    pub virtual_mac: MacAddr,

    /// The IP protocols this node carries, primary first.
    #[serde(default = "default_ip_protocols")]
    pub ip_protocols: Vec<IpProto>,

    /// Explicit conntrack zones. When absent, each protocol uses the
    /// well-known zones of the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct_zones: Option<BTreeMap<IpProto, CtZones>>,
}

impl Default for MulticlusterCfg {
    fn default() -> Self {
        Self {
            virtual_mac: GLOBAL_VIRTUAL_MAC,
            ip_protocols: default_ip_protocols(),
            ct_zones: None,
        }
    }
}

impl MulticlusterCfg {
    /// Build the zone map for the configured protocols.
    ///
    /// With explicit zones, every configured protocol must have an
    /// entry; zones for protocols not configured are ignored.
    pub fn zone_map(&self) -> Result<ZoneMap, ZoneError> {
        match &self.ct_zones {
            None => ZoneMap::new(&self.ip_protocols),

            Some(zones) => {
                let mut pairs = Vec::with_capacity(self.ip_protocols.len());
                for proto in &self.ip_protocols {
                    let pair = zones
                        .get(proto)
                        .ok_or(ZoneError::MissingProtocol(*proto))?;
                    pairs.push((*proto, *pair));
                }
                ZoneMap::with_zones(&pairs)
            }
        }
    }
}

/// What this node knows about itself.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodeCfg {
    /// The MAC address of the local gateway interface.
    pub gateway_mac: MacAddr,

    /// The IP of the local gateway interface, used as the translated
    /// source of cross-cluster Service connections.
    pub gateway_ip: IpAddr,

    /// The Service ClusterIP range of the local cluster.
    pub service_cidr: IpCidr,

    /// The switch port of the tunnel interface.
    pub tunnel_port: u32,

    /// Whether this node is the cluster's Multicluster gateway.
    #[serde(default)]
    pub is_gateway: bool,
}

/// A complete description of a node's place in a cluster set, as read
/// from a topology file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    #[serde(default)]
    pub multicluster: MulticlusterCfg,
    pub node: NodeCfg,
    #[serde(default, rename = "cluster")]
    pub clusters: Vec<ClusterCfg>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = MulticlusterCfg::default();
        assert_eq!(cfg.virtual_mac.to_string(), "aa:bb:cc:dd:ee:f0");
        assert_eq!(cfg.ip_protocols, vec![IpProto::Ipv4]);

        let zones = cfg.zone_map().unwrap();
        assert_eq!(zones.dnat(IpProto::Ipv4), Ok(0xfff0));
        assert_eq!(zones.snat(IpProto::Ipv4), Ok(0xfff1));
        assert!(zones.get(IpProto::Ipv6).is_err());

        let from_json: MulticlusterCfg = serde_json::from_str("{}").unwrap();
        assert_eq!(from_json, cfg);
    }

    #[test]
    fn explicit_zones() {
        let cfg: MulticlusterCfg = serde_json::from_str(
            r#"{
                "ip_protocols": ["ip", "ipv6"],
                "ct_zones": {
                    "ip": {"dnat": 100, "snat": 101},
                    "ipv6": {"dnat": 200, "snat": 201}
                }
            }"#,
        )
        .unwrap();

        let zones = cfg.zone_map().unwrap();
        assert_eq!(zones.dnat(IpProto::Ipv4), Ok(100));
        assert_eq!(zones.snat(IpProto::Ipv6), Ok(201));
    }

    #[test]
    fn explicit_zones_must_cover_protocols() {
        let mut cfg = MulticlusterCfg {
            ip_protocols: vec![IpProto::Ipv4, IpProto::Ipv6],
            ..Default::default()
        };
        let mut zones = BTreeMap::new();
        zones.insert(IpProto::Ipv4, CtZones { dnat: 1, snat: 2 });
        cfg.ct_zones = Some(zones);

        assert_eq!(
            cfg.zone_map(),
            Err(ZoneError::MissingProtocol(IpProto::Ipv6))
        );
    }

    #[test]
    fn unknown_fields_rejected() {
        let res: Result<MulticlusterCfg, _> =
            serde_json::from_str(r#"{"virtual_mack": "aa:bb:cc:dd:ee:f0"}"#);
        assert!(res.is_err());
    }
}
