// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Matches used for `Rule` selection.
//!
//! A [`Match`] renders in the switch's own flow syntax, which doubles
//! as the identity of a rule's match set (see [`crate::rule::RuleKey`]).
//! Each match can also be evaluated against a [`FlowMeta`], a summary
//! of the metadata the switch would see for a packet at a given table.

use crate::api::IpAddr;
use crate::api::IpCidr;
use crate::api::IpProto;
use crate::api::MacAddr;
use crate::fields::CtMark;
use crate::fields::RegMark;
use bitflags::bitflags;
use core::fmt;
use core::fmt::Display;

bitflags! {
    /// Connection tracking state bits.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct CtStateFlags: u8 {
        const NEW = 1 << 0;
        const EST = 1 << 1;
        const REL = 1 << 2;
        const RPL = 1 << 3;
        const INV = 1 << 4;
        const TRK = 1 << 5;
        const SNAT = 1 << 6;
        const DNAT = 1 << 7;
    }
}

const CT_STATE_NAMES: [(CtStateFlags, &str); 8] = [
    (CtStateFlags::NEW, "new"),
    (CtStateFlags::EST, "est"),
    (CtStateFlags::REL, "rel"),
    (CtStateFlags::RPL, "rpl"),
    (CtStateFlags::INV, "inv"),
    (CtStateFlags::TRK, "trk"),
    (CtStateFlags::SNAT, "snat"),
    (CtStateFlags::DNAT, "dnat"),
];

/// A match on connection tracking state.
///
/// Only bits in `mask` are compared; of those, bits in `set` must be
/// on and the rest must be off.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct CtStateMatch {
    pub set: CtStateFlags,
    pub mask: CtStateFlags,
}

impl CtStateMatch {
    pub fn with(mut self, flag: CtStateFlags, on: bool) -> Self {
        self.mask |= flag;
        self.set.set(flag, on);
        self
    }

    /// The first packet of a tracked connection.
    pub fn new_trk() -> Self {
        Self::default()
            .with(CtStateFlags::NEW, true)
            .with(CtStateFlags::TRK, true)
    }

    /// A tracked packet in the reply direction.
    pub fn rpl_trk() -> Self {
        Self::default()
            .with(CtStateFlags::RPL, true)
            .with(CtStateFlags::TRK, true)
    }

    pub fn is_match(&self, state: CtStateFlags) -> bool {
        state & self.mask == self.set
    }
}

impl Display for CtStateMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (flag, name) in CT_STATE_NAMES {
            if self.mask.contains(flag) {
                let sign = if self.set.contains(flag) { '+' } else { '-' };
                write!(f, "{sign}{name}")?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Match {
    Protocol(IpProto),
    InPort(u32),
    EthSrc(MacAddr),
    EthDst(MacAddr),
    IpSrc(IpAddr),
    IpDst(IpAddr),
    IpSrcNet(IpCidr),
    IpDstNet(IpCidr),
    CtState(CtStateMatch),
    CtMark(CtMark),
    RegMark(RegMark),
}

impl Match {
    /// The IP protocol an address match implies, if any.
    pub fn family(&self) -> Option<IpProto> {
        match self {
            Self::IpSrc(ip) | Self::IpDst(ip) => Some(IpProto::of(*ip)),
            Self::IpSrcNet(cidr) | Self::IpDstNet(cidr) => {
                Some(IpProto::of_cidr(cidr))
            }
            _ => None,
        }
    }

    /// The same match with any host bits of a CIDR cleared, so that
    /// `10.96.1.0/12` and `10.96.0.0/12` render identically.
    pub fn normalized(self) -> Self {
        match self {
            Self::IpSrcNet(cidr) => Self::IpSrcNet(network_of(cidr)),
            Self::IpDstNet(cidr) => Self::IpDstNet(network_of(cidr)),
            m => m,
        }
    }

    pub fn is_match(&self, meta: &FlowMeta) -> bool {
        match self {
            Self::Protocol(proto) => meta.proto() == Some(*proto),
            Self::InPort(port) => meta.in_port == *port,
            Self::EthSrc(mac) => meta.eth_src == *mac,
            Self::EthDst(mac) => meta.eth_dst == *mac,
            Self::IpSrc(ip) => meta.ip_src == Some(*ip),
            Self::IpDst(ip) => meta.ip_dst == Some(*ip),
            Self::IpSrcNet(cidr) => {
                meta.ip_src.is_some_and(|ip| cidr.contains(ip))
            }
            Self::IpDstNet(cidr) => {
                meta.ip_dst.is_some_and(|ip| cidr.contains(ip))
            }
            Self::CtState(ct) => ct.is_match(meta.ct_state),
            Self::CtMark(mark) => mark.is_set(meta.ct_mark),
            Self::RegMark(mark) => meta
                .regs
                .get(usize::from(mark.field.reg))
                .is_some_and(|reg| mark.is_set(*reg)),
        }
    }
}

fn network_of(cidr: IpCidr) -> IpCidr {
    IpCidr::new(cidr.network(), cidr.prefix()).unwrap_or(cidr)
}

fn ip_field(
    ip: &IpAddr,
    v4: &'static str,
    v6: &'static str,
) -> &'static str {
    match ip {
        IpAddr::V4(_) => v4,
        IpAddr::V6(_) => v6,
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Protocol(proto) => write!(f, "{proto}"),
            Self::InPort(port) => write!(f, "in_port={port}"),
            Self::EthSrc(mac) => write!(f, "dl_src={mac}"),
            Self::EthDst(mac) => write!(f, "dl_dst={mac}"),
            Self::IpSrc(ip) => {
                write!(f, "{}={ip}", ip_field(ip, "nw_src", "ipv6_src"))
            }
            Self::IpDst(ip) => {
                write!(f, "{}={ip}", ip_field(ip, "nw_dst", "ipv6_dst"))
            }
            Self::IpSrcNet(cidr) => {
                let field = ip_field(&cidr.ip(), "nw_src", "ipv6_src");
                write!(f, "{field}={cidr}")
            }
            Self::IpDstNet(cidr) => {
                let field = ip_field(&cidr.ip(), "nw_dst", "ipv6_dst");
                write!(f, "{field}={cidr}")
            }
            Self::CtState(ct) => write!(f, "ct_state={ct}"),
            Self::CtMark(mark) => write!(f, "ct_mark={mark}"),
            Self::RegMark(mark) => {
                let (value, mask) = mark.masked();
                if mark.field.range.is_full_word() {
                    write!(f, "reg{}={value:#x}", mark.field.reg)
                } else {
                    write!(f, "reg{}={value:#x}/{mask:#x}", mark.field.reg)
                }
            }
        }
    }
}

/// The metadata of a packet as it reaches a table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlowMeta {
    pub in_port: u32,
    pub eth_src: MacAddr,
    pub eth_dst: MacAddr,
    pub ip_src: Option<IpAddr>,
    pub ip_dst: Option<IpAddr>,
    pub ct_state: CtStateFlags,
    pub ct_mark: u32,
    pub regs: [u32; 8],
}

impl FlowMeta {
    /// The IP protocol of the packet, judged by its destination.
    pub fn proto(&self) -> Option<IpProto> {
        self.ip_dst.or(self.ip_src).map(IpProto::of)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fields::CONN_SNAT_CT_MARK;
    use crate::fields::TARGET_OFPORT_FIELD;
    use crate::fields::TO_TUNNEL_REG_MARK;

    #[test]
    fn ct_state_render_and_match() {
        let m = CtStateMatch::new_trk();
        assert_eq!(m.to_string(), "+new+trk");
        assert_eq!(CtStateMatch::rpl_trk().to_string(), "+rpl+trk");

        let not_new = CtStateMatch::default()
            .with(CtStateFlags::NEW, false)
            .with(CtStateFlags::TRK, true);
        assert_eq!(not_new.to_string(), "-new+trk");

        assert!(m.is_match(CtStateFlags::NEW | CtStateFlags::TRK));
        assert!(m.is_match(
            CtStateFlags::NEW | CtStateFlags::TRK | CtStateFlags::DNAT
        ));
        assert!(!m.is_match(CtStateFlags::EST | CtStateFlags::TRK));
        assert!(!not_new.is_match(CtStateFlags::NEW | CtStateFlags::TRK));
    }

    #[test]
    fn match_rendering() {
        let cidr: IpCidr = "10.96.0.0/12".parse().unwrap();
        let v6: IpAddr = "fd00::2".parse().unwrap();
        let mac: MacAddr = "aa:bb:cc:dd:ee:f0".parse().unwrap();

        assert_eq!(Match::Protocol(IpProto::Ipv4).to_string(), "ip");
        assert_eq!(Match::IpDstNet(cidr).to_string(), "nw_dst=10.96.0.0/12");
        assert_eq!(Match::IpDst(v6).to_string(), "ipv6_dst=fd00::2");
        assert_eq!(Match::EthDst(mac).to_string(), "dl_dst=aa:bb:cc:dd:ee:f0");
        assert_eq!(Match::InPort(7).to_string(), "in_port=7");
        assert_eq!(
            Match::RegMark(TO_TUNNEL_REG_MARK).to_string(),
            "reg0=0x10/0xf0"
        );
        assert_eq!(
            Match::RegMark(RegMark::new(TARGET_OFPORT_FIELD, 7)).to_string(),
            "reg1=0x7"
        );
        assert_eq!(
            Match::CtMark(CONN_SNAT_CT_MARK).to_string(),
            "ct_mark=0x20/0x20"
        );
    }

    #[test]
    fn match_meta() {
        let cidr: IpCidr = "10.96.0.0/12".parse().unwrap();
        let mut meta = FlowMeta {
            in_port: 7,
            ip_dst: Some("10.100.1.1".parse().unwrap()),
            ..Default::default()
        };
        meta.regs[1] = 7;

        assert!(Match::IpDstNet(cidr).is_match(&meta));
        assert!(Match::Protocol(IpProto::Ipv4).is_match(&meta));
        assert!(!Match::Protocol(IpProto::Ipv6).is_match(&meta));
        assert!(Match::InPort(7).is_match(&meta));
        let target = RegMark::new(TARGET_OFPORT_FIELD, 7);
        assert!(Match::RegMark(target).is_match(&meta));
        assert!(!Match::IpSrcNet(cidr).is_match(&meta));

        meta.ip_dst = Some("10.112.0.1".parse().unwrap());
        assert!(!Match::IpDstNet(cidr).is_match(&meta));
    }

    #[test]
    fn host_bits_cleared() {
        let loose: IpCidr = "10.96.1.0/12".parse().unwrap();
        let v6: IpCidr = "fd00:10:96::1/112".parse().unwrap();
        let m = Match::IpDstNet(loose).normalized();
        assert_eq!(m.to_string(), "nw_dst=10.96.0.0/12");
        assert_eq!(m, Match::IpDstNet("10.96.0.0/12".parse().unwrap()));
        assert_eq!(
            Match::IpSrcNet(v6).normalized().to_string(),
            "ipv6_src=fd00:10:96::/112"
        );
        assert_eq!(Match::InPort(7).normalized(), Match::InPort(7));
    }

    #[test]
    fn family_of_address_matches() {
        let v4: IpAddr = "10.0.0.2".parse().unwrap();
        let v6: IpCidr = "fd00:10:96::/112".parse().unwrap();
        assert_eq!(Match::IpDst(v4).family(), Some(IpProto::Ipv4));
        assert_eq!(Match::IpDstNet(v6).family(), Some(IpProto::Ipv6));
        assert_eq!(Match::InPort(7).family(), None);
    }
}
