// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The actions a rule applies to a matching packet.
//!
//! Actions execute in the order given. They render in the switch's
//! flow syntax, so a finalized rule's action list can be compared
//! textually against what the switch reports.

use crate::api::IpAddr;
use crate::api::MacAddr;
use crate::fields::CtMark;
use crate::fields::RegMark;
use crate::table::Stage;
use crate::table::TableId;
use core::fmt;
use core::fmt::Display;

/// Where a packet proceeds to.
///
/// Only [`Goto::Table`] survives rule finalization; the other forms
/// are resolved against the pipeline.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Goto {
    Table(TableId),
    /// The first table of a stage.
    Stage(Stage),
    /// The table following the rule's own table.
    Next,
}

impl Display for Goto {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Table(id) => write!(f, "{id}"),
            Self::Stage(stage) => write!(f, "stage:{stage}"),
            Self::Next => write!(f, "next"),
        }
    }
}

/// An inclusive range of addresses to translate to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NatRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl NatRange {
    pub fn single(ip: IpAddr) -> Self {
        Self { start: ip, end: ip }
    }
}

impl Display for NatRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fmt_ip = |ip: &IpAddr| match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{v6}]"),
        };

        if self.start == self.end {
            write!(f, "{}", fmt_ip(&self.start))
        } else {
            write!(f, "{}-{}", fmt_ip(&self.start), fmt_ip(&self.end))
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CtNat {
    /// Translate the source address of new connections.
    Src(NatRange),
    /// Translate the destination address of new connections.
    Dst(NatRange),
    /// Apply whatever translation the zone has recorded for the
    /// connection. Used on reply traffic.
    Restore,
}

impl Display for CtNat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Src(range) => write!(f, "nat(src={range})"),
            Self::Dst(range) => write!(f, "nat(dst={range})"),
            Self::Restore => write!(f, "nat"),
        }
    }
}

/// Send the packet through connection tracking in `zone`.
///
/// With `table` set, the packet is resubmitted to that table once
/// conntrack has run, carrying the resulting conntrack state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CtAction {
    pub commit: bool,
    pub table: Option<Goto>,
    pub zone: u16,
    /// Written into the connection entry on commit.
    pub mark: Option<CtMark>,
    pub nat: Option<CtNat>,
}

impl Display for CtAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut args = vec![];
        if self.commit {
            args.push("commit".to_string());
        }
        if let Some(table) = &self.table {
            args.push(format!("table={table}"));
        }
        args.push(format!("zone={}", self.zone));
        if let Some(mark) = &self.mark {
            args.push(format!("exec(set_field:{mark}->ct_mark)"));
        }
        if let Some(nat) = &self.nat {
            args.push(nat.to_string());
        }
        write!(f, "ct({})", args.join(","))
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    SetEthSrc(MacAddr),
    SetEthDst(MacAddr),
    /// Select the remote endpoint of a flow-based tunnel.
    SetTunnelDst(IpAddr),
    LoadRegMark(RegMark),
    Ct(CtAction),
    Goto(Goto),
    Output(u32),
    /// Output on the port the packet arrived on.
    OutputInPort,
}

impl Action {
    /// The table this action continues processing in, if any.
    pub fn goto_target(&self) -> Option<&Goto> {
        match self {
            Self::Goto(goto) => Some(goto),
            Self::Ct(ct) => ct.table.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn goto_target_mut(&mut self) -> Option<&mut Goto> {
        match self {
            Self::Goto(goto) => Some(goto),
            Self::Ct(ct) => ct.table.as_mut(),
            _ => None,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SetEthSrc(mac) => write!(f, "set_field:{mac}->eth_src"),
            Self::SetEthDst(mac) => write!(f, "set_field:{mac}->eth_dst"),
            Self::SetTunnelDst(ip @ IpAddr::V4(_)) => {
                write!(f, "set_field:{ip}->tun_dst")
            }
            Self::SetTunnelDst(ip @ IpAddr::V6(_)) => {
                write!(f, "set_field:{ip}->tun_ipv6_dst")
            }
            Self::LoadRegMark(mark) => {
                let (value, mask) = mark.masked();
                if mark.field.range.is_full_word() {
                    write!(f, "set_field:{value:#x}->reg{}", mark.field.reg)
                } else {
                    write!(
                        f,
                        "set_field:{value:#x}/{mask:#x}->reg{}",
                        mark.field.reg
                    )
                }
            }
            Self::Ct(ct) => write!(f, "{ct}"),
            Self::Goto(goto) => write!(f, "goto_table:{goto}"),
            Self::Output(port) => write!(f, "output:{port}"),
            Self::OutputInPort => write!(f, "IN_PORT"),
        }
    }
}
