// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

pub use ipnetwork::IpNetwork as IpCidr;
pub use ipnetwork::Ipv4Network as Ipv4Cidr;
pub use ipnetwork::Ipv6Network as Ipv6Cidr;
pub use std::net::IpAddr;
pub use std::net::Ipv4Addr;
pub use std::net::Ipv6Addr;

/// The IP protocol a rule is scoped to.
///
/// Rules matching on L3 fields must name the protocol they apply to;
/// the switch refuses an address match without one. The textual forms
/// follow the switch's own keywords: `ip` and `ipv6`.
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
pub enum IpProto {
    #[serde(rename = "ip")]
    Ipv4,
    #[serde(rename = "ipv6")]
    Ipv6,
}

impl IpProto {
    pub const ALL: [IpProto; 2] = [IpProto::Ipv4, IpProto::Ipv6];

    /// Return the protocol of the given address.
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    /// Return the protocol of the given CIDR block.
    pub fn of_cidr(cidr: &IpCidr) -> Self {
        match cidr {
            IpCidr::V4(_) => Self::Ipv4,
            IpCidr::V6(_) => Self::Ipv6,
        }
    }
}

impl Display for IpProto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Ipv4 => write!(f, "ip"),
            Self::Ipv6 => write!(f, "ipv6"),
        }
    }
}

impl FromStr for IpProto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" | "ip4" | "ipv4" => Ok(Self::Ipv4),
            "ip6" | "ipv6" => Ok(Self::Ipv6),
            _ => Err(format!("invalid IP protocol: {s}")),
        }
    }
}
