// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Conntrack zone assignment.
//!
//! Connections needing both destination and source translation are
//! tracked twice: first in a DNAT zone, where the destination is
//! translated and the connection is marked for SNAT, and later in a
//! separate SNAT zone, where the source is translated. A zone only
//! sees the translations made within it, so the two zones must differ
//! for each IP protocol.

use crate::api::IpProto;
use crate::rule::BuildError;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const CT_ZONE: u16 = 0xfff0;
pub const CT_ZONE_V6: u16 = 0xffe6;
pub const SNAT_CT_ZONE: u16 = 0xfff1;
pub const SNAT_CT_ZONE_V6: u16 = 0xffe7;

/// The pair of zones used for one IP protocol.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct CtZones {
    pub dnat: u16,
    pub snat: u16,
}

impl CtZones {
    /// The well-known zones of `proto`.
    pub const fn standard(proto: IpProto) -> Self {
        match proto {
            IpProto::Ipv4 => Self { dnat: CT_ZONE, snat: SNAT_CT_ZONE },
            IpProto::Ipv6 => Self { dnat: CT_ZONE_V6, snat: SNAT_CT_ZONE_V6 },
        }
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ZoneError {
    #[error("no IP protocols given")]
    NoProtocols,

    #[error("protocol {0} listed more than once")]
    DuplicateProtocol(IpProto),

    #[error("protocol {proto} uses zone {zone} for both DNAT and SNAT")]
    SharedZone { proto: IpProto, zone: u16 },

    #[error("zone {zone} is used by both {first} and {second}")]
    ZoneReused { zone: u16, first: IpProto, second: IpProto },

    #[error("no zones given for protocol {0}")]
    MissingProtocol(IpProto),
}

/// The conntrack zones of every IP protocol a feature handles.
///
/// Every protocol has an explicit entry; looking up any other protocol
/// is an error rather than a fallback to some default zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneMap {
    zones: BTreeMap<IpProto, CtZones>,
}

impl ZoneMap {
    /// Assign the well-known zones to each of `protos`.
    pub fn new(protos: &[IpProto]) -> Result<Self, ZoneError> {
        let zones: Vec<_> =
            protos.iter().map(|p| (*p, CtZones::standard(*p))).collect();
        Self::with_zones(&zones)
    }

    /// Use explicitly chosen zones.
    pub fn with_zones(zones: &[(IpProto, CtZones)]) -> Result<Self, ZoneError> {
        if zones.is_empty() {
            return Err(ZoneError::NoProtocols);
        }

        let mut map: BTreeMap<IpProto, CtZones> = BTreeMap::new();
        for (proto, pair) in zones {
            if map.contains_key(proto) {
                return Err(ZoneError::DuplicateProtocol(*proto));
            }

            if pair.dnat == pair.snat {
                return Err(ZoneError::SharedZone {
                    proto: *proto,
                    zone: pair.dnat,
                });
            }

            for (other, other_pair) in &map {
                for zone in [pair.dnat, pair.snat] {
                    if zone == other_pair.dnat || zone == other_pair.snat {
                        return Err(ZoneError::ZoneReused {
                            zone,
                            first: *other,
                            second: *proto,
                        });
                    }
                }
            }

            map.insert(*proto, *pair);
        }

        Ok(Self { zones: map })
    }

    pub fn get(&self, proto: IpProto) -> Result<CtZones, BuildError> {
        self.zones.get(&proto).copied().ok_or(BuildError::NoCtZone(proto))
    }

    pub fn dnat(&self, proto: IpProto) -> Result<u16, BuildError> {
        Ok(self.get(proto)?.dnat)
    }

    pub fn snat(&self, proto: IpProto) -> Result<u16, BuildError> {
        Ok(self.get(proto)?.snat)
    }

    pub fn protocols(&self) -> impl Iterator<Item = IpProto> + '_ {
        self.zones.keys().copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn standard_zones_are_distinct() {
        let map = ZoneMap::new(&IpProto::ALL).unwrap();
        for proto in map.protocols() {
            let zones = map.get(proto).unwrap();
            assert_ne!(zones.dnat, zones.snat);
        }
        assert_eq!(map.dnat(IpProto::Ipv4), Ok(0xfff0));
        assert_eq!(map.snat(IpProto::Ipv4), Ok(0xfff1));
        assert_eq!(map.dnat(IpProto::Ipv6), Ok(0xffe6));
        assert_eq!(map.snat(IpProto::Ipv6), Ok(0xffe7));
    }

    #[test]
    fn missing_protocol_is_an_error() {
        let map = ZoneMap::new(&[IpProto::Ipv4]).unwrap();
        assert_eq!(
            map.snat(IpProto::Ipv6),
            Err(BuildError::NoCtZone(IpProto::Ipv6))
        );
        assert_eq!(map.protocols().collect::<Vec<_>>(), vec![IpProto::Ipv4]);
    }

    #[test]
    fn bad_zone_maps() {
        assert_eq!(ZoneMap::new(&[]), Err(ZoneError::NoProtocols));
        assert_eq!(
            ZoneMap::new(&[IpProto::Ipv4, IpProto::Ipv4]),
            Err(ZoneError::DuplicateProtocol(IpProto::Ipv4))
        );

        let shared = CtZones { dnat: 5, snat: 5 };
        assert_eq!(
            ZoneMap::with_zones(&[(IpProto::Ipv4, shared)]),
            Err(ZoneError::SharedZone { proto: IpProto::Ipv4, zone: 5 })
        );

        let v4 = CtZones { dnat: 1, snat: 2 };
        let v6 = CtZones { dnat: 3, snat: 1 };
        assert!(matches!(
            ZoneMap::with_zones(&[(IpProto::Ipv4, v4), (IpProto::Ipv6, v6)]),
            Err(ZoneError::ZoneReused { zone: 1, .. })
        ));

        let a = CtZones { dnat: 1, snat: 2 };
        let b = CtZones { dnat: 3, snat: 4 };
        assert_eq!(
            ZoneMap::with_zones(&[(IpProto::Ipv6, a), (IpProto::Ipv6, b)]),
            Err(ZoneError::DuplicateProtocol(IpProto::Ipv6))
        );
    }
}
