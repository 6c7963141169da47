// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Rule cookies.
//!
//! Every rule carries a 64-bit cookie naming the feature which owns
//! it and the synthesis request which produced it. The switch lets us
//! select flows by cookie value and mask, which is how a feature's
//! rules are found in bulk without looking at their match content.
//!
//! ```text
//! 63            48 47         40 39                                 0
//! +---------------+-------------+------------------------------------+
//! |     round     |  category   |              sequence              |
//! +---------------+-------------+------------------------------------+
//! ```
//!
//! The round identifies an incarnation of the agent. After a restart
//! the agent picks a new round, which lets it find (and delete) the
//! rules a previous incarnation left in the switch.

use core::fmt;
use core::fmt::Display;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;
use serde::Deserialize;
use serde::Serialize;

pub const ROUND_BITS: u32 = 16;
pub const CATEGORY_BITS: u32 = 8;
pub const SEQ_BITS: u32 = 40;

const CATEGORY_SHIFT: u32 = SEQ_BITS;
const ROUND_SHIFT: u32 = SEQ_BITS + CATEGORY_BITS;

const SEQ_MASK: u64 = (1 << SEQ_BITS) - 1;
const CATEGORY_MASK: u64 = ((1 << CATEGORY_BITS) - 1) << CATEGORY_SHIFT;
const ROUND_MASK: u64 = ((1 << ROUND_BITS) - 1) << ROUND_SHIFT;

/// The largest sequence number a category may be issued.
pub const MAX_SEQ: u64 = SEQ_MASK;

/// The feature owning a rule.
///
/// There is exactly one category per pipeline feature.
#[repr(u8)]
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
pub enum Category {
    Default = 0,
    Gateway = 1,
    Tunnel = 2,
    PodConnectivity = 3,
    NetworkPolicy = 4,
    Service = 5,
    Egress = 6,
    Multicast = 7,
    Traceflow = 8,
    Multicluster = 9,
}

impl Category {
    /// Every category, indexed by its raw value.
    pub const ALL: [Category; 10] = [
        Category::Default,
        Category::Gateway,
        Category::Tunnel,
        Category::PodConnectivity,
        Category::NetworkPolicy,
        Category::Service,
        Category::Egress,
        Category::Multicast,
        Category::Traceflow,
        Category::Multicluster,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Gateway => "Gateway",
            Self::Tunnel => "Tunnel",
            Self::PodConnectivity => "PodConnectivity",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Service => "Service",
            Self::Egress => "Egress",
            Self::Multicast => "Multicast",
            Self::Traceflow => "Traceflow",
            Self::Multicluster => "Multicluster",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An opaque rule identifier.
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
pub struct Cookie(u64);

impl Cookie {
    pub const fn new(round: u16, category: Category, seq: u64) -> Self {
        Self(
            ((round as u64) << ROUND_SHIFT)
                | ((category as u64) << CATEGORY_SHIFT)
                | (seq & SEQ_MASK),
        )
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The value written into the switch.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn round(&self) -> u16 {
        ((self.0 & ROUND_MASK) >> ROUND_SHIFT) as u16
    }

    /// Decode the owning category.
    ///
    /// Only a cookie built from a raw value can carry an unknown
    /// category; those issued by an [`Allocator`] always decode.
    pub fn category(&self) -> Option<Category> {
        Category::from_raw(((self.0 & CATEGORY_MASK) >> CATEGORY_SHIFT) as u8)
    }

    pub const fn seq(&self) -> u64 {
        self.0 & SEQ_MASK
    }
}

impl Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A value and mask selecting a set of cookies, in the form the
/// switch accepts for bulk flow modification and deletion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CookieMatch {
    pub value: u64,
    pub mask: u64,
}

impl CookieMatch {
    /// Select every cookie of the given category, in any round.
    pub const fn category(category: Category) -> Self {
        Self {
            value: (category as u64) << CATEGORY_SHIFT,
            mask: CATEGORY_MASK,
        }
    }

    /// Select every cookie issued in the given round.
    pub const fn round(round: u16) -> Self {
        Self { value: (round as u64) << ROUND_SHIFT, mask: ROUND_MASK }
    }

    /// Select the cookies of one category issued in one round.
    pub const fn round_category(round: u16, category: Category) -> Self {
        Self {
            value: ((round as u64) << ROUND_SHIFT)
                | ((category as u64) << CATEGORY_SHIFT),
            mask: ROUND_MASK | CATEGORY_MASK,
        }
    }

    pub fn is_match(&self, cookie: Cookie) -> bool {
        cookie.raw() & self.mask == self.value
    }
}

impl Display for CookieMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}/{:#x}", self.value, self.mask)
    }
}

/// Issues cookies for every category within a single round.
///
/// Each category has its own sequence counter. Requests are lock free
/// and may be made concurrently from any number of threads.
#[derive(Debug)]
pub struct Allocator {
    round: u16,
    seqs: [AtomicU64; Category::COUNT],
}

impl Allocator {
    pub fn new(round: u16) -> Self {
        Self { round, seqs: core::array::from_fn(|_| AtomicU64::new(0)) }
    }

    pub fn round(&self) -> u16 {
        self.round
    }

    /// Issue a new cookie for `category`.
    ///
    /// The first cookie of a category has sequence number 1.
    ///
    /// # Panics
    ///
    /// Running out of sequence numbers means rule synthesis has gone
    /// badly wrong. There is no sensible way to continue, so this
    /// panics rather than hand out a duplicate cookie.
    pub fn request(&self, category: Category) -> Cookie {
        let counter = &self.seqs[category as usize];
        let res =
            counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seq| {
                (seq < MAX_SEQ).then_some(seq + 1)
            });

        match res {
            Ok(prev) => Cookie::new(self.round, category, prev + 1),
            Err(_) => panic!("cookie sequence exhausted for {category}"),
        }
    }

    /// The number of cookies issued so far for `category`.
    pub fn issued(&self, category: Category) -> u64 {
        self.seqs[category as usize].load(Ordering::Relaxed)
    }

    /// Move the sequence counter of `category` to `seq`.
    #[cfg(any(feature = "test-help", test))]
    pub fn set_seq(&self, category: Category, seq: u64) {
        self.seqs[category as usize].store(seq, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    #[test]
    fn category_raw_values_index_all() {
        for (i, cat) in Category::ALL.iter().enumerate() {
            assert_eq!(*cat as usize, i);
            assert_eq!(Category::from_raw(i as u8), Some(*cat));
        }
        assert_eq!(Category::from_raw(Category::COUNT as u8), None);
    }

    #[test]
    fn cookie_fields_decode() {
        let c = Cookie::new(0xBEEF, Category::Multicluster, 42);
        assert_eq!(c.round(), 0xBEEF);
        assert_eq!(c.category(), Some(Category::Multicluster));
        assert_eq!(c.seq(), 42);
        assert_eq!(c.raw(), 0xBEEF_0900_0000_002A);
        assert_eq!(c.to_string(), "0xbeef09000000002a");

        let unknown = Cookie::from_raw(0xFF << CATEGORY_SHIFT);
        assert_eq!(unknown.category(), None);
    }

    #[test]
    fn requests_are_unique_and_decode() {
        let alloc = Allocator::new(3);
        let mut seen = BTreeSet::new();
        for _ in 0..10 {
            for cat in Category::ALL {
                let c = alloc.request(cat);
                assert_eq!(c.category(), Some(cat));
                assert_eq!(c.round(), 3);
                assert!(seen.insert(c), "duplicate cookie {c}");
            }
        }
        assert_eq!(alloc.issued(Category::Multicluster), 10);
    }

    #[test]
    fn category_counters_are_independent() {
        let alloc = Allocator::new(0);
        assert_eq!(alloc.request(Category::Service).seq(), 1);
        assert_eq!(alloc.request(Category::Service).seq(), 2);
        assert_eq!(alloc.request(Category::Multicluster).seq(), 1);
    }

    #[test]
    fn concurrent_requests_are_unique() {
        let alloc = Arc::new(Allocator::new(1));
        let cookies: Vec<Cookie> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let alloc = &alloc;
                    s.spawn(move || {
                        let cat = Category::ALL[i % 2 + 8];
                        (0..500).map(|_| alloc.request(cat)).collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let unique: BTreeSet<_> = cookies.iter().copied().collect();
        assert_eq!(unique.len(), 8 * 500);
        assert_eq!(alloc.issued(Category::Traceflow), 4 * 500);
        assert_eq!(alloc.issued(Category::Multicluster), 4 * 500);
    }

    #[test]
    fn last_sequence_is_issued() {
        let alloc = Allocator::new(0);
        alloc.set_seq(Category::Egress, MAX_SEQ - 1);
        let c = alloc.request(Category::Egress);
        assert_eq!(c.seq(), MAX_SEQ);
        assert_eq!(c.category(), Some(Category::Egress));
    }

    #[test]
    #[should_panic(expected = "cookie sequence exhausted")]
    fn exhaustion_is_fatal() {
        let alloc = Allocator::new(0);
        alloc.set_seq(Category::Egress, MAX_SEQ);
        alloc.request(Category::Egress);
    }

    #[test]
    fn cookie_match_selects() {
        let alloc = Allocator::new(7);
        let mc = alloc.request(Category::Multicluster);
        let svc = alloc.request(Category::Service);

        let by_cat = CookieMatch::category(Category::Multicluster);
        assert!(by_cat.is_match(mc));
        assert!(!by_cat.is_match(svc));

        let by_round = CookieMatch::round(7);
        assert!(by_round.is_match(mc));
        assert!(by_round.is_match(svc));
        assert!(!CookieMatch::round(8).is_match(mc));

        let both = CookieMatch::round_category(7, Category::Service);
        assert!(both.is_match(svc));
        assert!(!both.is_match(mc));
        assert!(!both.is_match(Cookie::new(6, Category::Service, 1)));
    }
}
