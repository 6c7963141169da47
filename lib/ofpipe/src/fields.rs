// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Packet metadata fields shared by the pipeline's features.
//!
//! Tables communicate decisions to later tables by loading values into
//! bit ranges of the switch's 32-bit registers, or into the mark of
//! the packet's conntrack entry. The layout of these fields is a
//! pipeline-wide contract: every feature must agree on it.

use core::fmt;
use core::fmt::Display;

/// An inclusive range of bits.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BitRange {
    pub start: u8,
    pub end: u8,
}

impl BitRange {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    pub const fn bit(n: u8) -> Self {
        Self { start: n, end: n }
    }

    pub const fn width(&self) -> u32 {
        (self.end - self.start) as u32 + 1
    }

    /// The mask covering this range, in place.
    pub const fn mask(&self) -> u32 {
        let w = self.width();
        let ones = if w >= 32 { u32::MAX } else { (1 << w) - 1 };
        ones << self.start
    }

    /// Does `value` fit in this range?
    pub const fn fits(&self, value: u32) -> bool {
        let w = self.width();
        w >= 32 || value < (1 << w)
    }

    pub const fn is_full_word(&self) -> bool {
        self.start == 0 && self.end == 31
    }
}

impl Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// A bit range within one register.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RegField {
    pub reg: u8,
    pub range: BitRange,
    pub name: &'static str,
}

impl RegField {
    pub const fn new(reg: u8, range: BitRange, name: &'static str) -> Self {
        Self { reg, range, name }
    }
}

impl Display for RegField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.range.is_full_word() {
            write!(f, "NXM_NX_REG{}[]", self.reg)
        } else {
            write!(f, "NXM_NX_REG{}[{}]", self.reg, self.range)
        }
    }
}

/// A value for a [`RegField`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RegMark {
    pub field: RegField,
    pub value: u32,
}

impl RegMark {
    pub const fn new(field: RegField, value: u32) -> Self {
        Self { field, value }
    }

    pub const fn fits(&self) -> bool {
        self.field.range.fits(self.value)
    }

    /// The mark as a value/mask pair over the whole register.
    pub const fn masked(&self) -> (u32, u32) {
        (self.value << self.field.range.start, self.field.range.mask())
    }

    pub fn is_set(&self, reg: u32) -> bool {
        let (value, mask) = self.masked();
        reg & mask == value
    }
}

/// A bit range within the conntrack mark.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CtMarkField {
    pub range: BitRange,
    pub name: &'static str,
}

/// A value for a [`CtMarkField`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CtMark {
    pub field: CtMarkField,
    pub value: u32,
}

impl CtMark {
    pub const fn new(field: CtMarkField, value: u32) -> Self {
        Self { field, value }
    }

    pub const fn fits(&self) -> bool {
        self.field.range.fits(self.value)
    }

    pub const fn masked(&self) -> (u32, u32) {
        (self.value << self.field.range.start, self.field.range.mask())
    }

    pub fn is_set(&self, mark: u32) -> bool {
        let (value, mask) = self.masked();
        mark & mask == value
    }
}

impl Display for CtMark {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (value, mask) = self.masked();
        write!(f, "{value:#x}/{mask:#x}")
    }
}

/// Where the packet entered the pipeline from.
pub const PKT_SOURCE_FIELD: RegField =
    RegField::new(0, BitRange::new(0, 3), "PktSource");
pub const FROM_TUNNEL_REG_MARK: RegMark = RegMark::new(PKT_SOURCE_FIELD, 1);
pub const FROM_GATEWAY_REG_MARK: RegMark = RegMark::new(PKT_SOURCE_FIELD, 2);
pub const FROM_LOCAL_REG_MARK: RegMark = RegMark::new(PKT_SOURCE_FIELD, 3);

/// Where the packet is headed once it leaves the pipeline.
pub const PKT_DESTINATION_FIELD: RegField =
    RegField::new(0, BitRange::new(4, 7), "PktDestination");
pub const TO_TUNNEL_REG_MARK: RegMark = RegMark::new(PKT_DESTINATION_FIELD, 1);
pub const TO_GATEWAY_REG_MARK: RegMark =
    RegMark::new(PKT_DESTINATION_FIELD, 2);

/// Set when the L3 forwarding stage must rewrite the MAC addresses.
pub const REWRITE_MAC_FIELD: RegField =
    RegField::new(0, BitRange::bit(9), "RewriteMAC");
pub const REWRITE_MAC_REG_MARK: RegMark = RegMark::new(REWRITE_MAC_FIELD, 1);

/// The port the packet will be output on.
pub const TARGET_OFPORT_FIELD: RegField =
    RegField::new(1, BitRange::new(0, 31), "TargetOFPort");

/// Set on connections whose source must be translated.
pub const CONN_SNAT_FIELD: CtMarkField =
    CtMarkField { range: BitRange::bit(5), name: "ConnSNAT" };
pub const CONN_SNAT_CT_MARK: CtMark = CtMark::new(CONN_SNAT_FIELD, 1);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(BitRange::new(0, 3).mask(), 0xF);
        assert_eq!(BitRange::new(4, 7).mask(), 0xF0);
        assert_eq!(BitRange::bit(9).mask(), 0x200);
        assert_eq!(BitRange::new(0, 31).mask(), u32::MAX);
        assert!(BitRange::new(0, 3).fits(15));
        assert!(!BitRange::new(0, 3).fits(16));
        assert!(BitRange::new(0, 31).fits(u32::MAX));
    }

    #[test]
    fn marks_in_place() {
        assert_eq!(TO_TUNNEL_REG_MARK.masked(), (0x10, 0xF0));
        assert!(TO_TUNNEL_REG_MARK.is_set(0x13));
        assert!(!TO_TUNNEL_REG_MARK.is_set(0x23));
        assert_eq!(CONN_SNAT_CT_MARK.to_string(), "0x20/0x20");
        assert!(CONN_SNAT_CT_MARK.is_set(0x21));
        assert!(!RegMark::new(PKT_SOURCE_FIELD, 16).fits());
    }

    #[test]
    fn sources_exclusive() {
        let reg = FROM_GATEWAY_REG_MARK.masked().0;
        assert!(FROM_GATEWAY_REG_MARK.is_set(reg));
        assert!(!FROM_TUNNEL_REG_MARK.is_set(reg));
        assert!(!FROM_LOCAL_REG_MARK.is_set(reg));
        assert!(!TO_GATEWAY_REG_MARK.is_set(reg));
    }

    #[test]
    fn field_display() {
        assert_eq!(PKT_SOURCE_FIELD.to_string(), "NXM_NX_REG0[0..3]");
        assert_eq!(REWRITE_MAC_FIELD.to_string(), "NXM_NX_REG0[9]");
        assert_eq!(TARGET_OFPORT_FIELD.to_string(), "NXM_NX_REG1[]");
    }
}
