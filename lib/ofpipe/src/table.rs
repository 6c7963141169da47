// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The pipeline table registry.
//!
//! A packet enters the pipeline at the first table and moves forward
//! by explicit goto (or conntrack resubmit) actions. Tables are grouped
//! into stages, and both tables and stages are ordered in the direction
//! of packet processing. The registry is static for the lifetime of
//! the agent; it is consulted when a rule is finalized to resolve goto
//! targets to concrete table IDs.

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A group of consecutive tables serving one purpose.
///
/// The declaration order is the processing order.
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
pub enum Stage {
    Classifier,
    Validation,
    ConntrackState,
    PreRouting,
    EgressSecurity,
    Routing,
    PostRouting,
    Switching,
    IngressSecurity,
    Conntrack,
    Output,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The numeric identifier of a table, as seen by the switch.
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
pub struct TableId(pub u8);

impl Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Table {
    pub name: &'static str,
    pub id: TableId,
    pub stage: Stage,
}

impl Table {
    pub const fn new(name: &'static str, id: u8, stage: Stage) -> Self {
        Self { name, id: TableId(id), stage }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

pub const CLASSIFIER: Table = Table::new("Classifier", 0, Stage::Classifier);
pub const SPOOF_GUARD: Table = Table::new("SpoofGuard", 1, Stage::Validation);
pub const UN_SNAT: Table = Table::new("UnSNAT", 10, Stage::ConntrackState);
pub const CONNTRACK_ZONE: Table =
    Table::new("ConntrackZone", 11, Stage::ConntrackState);
pub const CONNTRACK_STATE: Table =
    Table::new("ConntrackState", 12, Stage::ConntrackState);
pub const PRE_ROUTING_CLASSIFIER: Table =
    Table::new("PreRoutingClassifier", 20, Stage::PreRouting);
pub const SERVICE_LB: Table = Table::new("ServiceLB", 21, Stage::PreRouting);
pub const ENDPOINT_DNAT: Table =
    Table::new("EndpointDNAT", 22, Stage::PreRouting);
pub const EGRESS_RULE: Table =
    Table::new("EgressRule", 30, Stage::EgressSecurity);
pub const L3_FORWARDING: Table =
    Table::new("L3Forwarding", 40, Stage::Routing);
pub const L3_DEC_TTL: Table = Table::new("L3DecTTL", 41, Stage::Routing);
pub const SNAT_MARK: Table = Table::new("SNATMark", 50, Stage::PostRouting);
pub const SNAT: Table = Table::new("SNAT", 51, Stage::PostRouting);
pub const L2_FORWARDING_CALC: Table =
    Table::new("L2ForwardingCalc", 60, Stage::Switching);
pub const INGRESS_RULE: Table =
    Table::new("IngressRule", 70, Stage::IngressSecurity);
pub const CONNTRACK_COMMIT: Table =
    Table::new("ConntrackCommit", 80, Stage::Conntrack);
pub const OUTPUT: Table = Table::new("Output", 90, Stage::Output);

/// The tables of the standard pipeline, in processing order.
pub const DEFAULT_TABLES: [Table; 17] = [
    CLASSIFIER,
    SPOOF_GUARD,
    UN_SNAT,
    CONNTRACK_ZONE,
    CONNTRACK_STATE,
    PRE_ROUTING_CLASSIFIER,
    SERVICE_LB,
    ENDPOINT_DNAT,
    EGRESS_RULE,
    L3_FORWARDING,
    L3_DEC_TTL,
    SNAT_MARK,
    SNAT,
    L2_FORWARDING_CALC,
    INGRESS_RULE,
    CONNTRACK_COMMIT,
    OUTPUT,
];

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PipelineError {
    #[error("pipeline has no tables")]
    Empty,

    #[error("table {name} has id {id}, not greater than previous id {prev}")]
    NonIncreasingId { name: &'static str, id: TableId, prev: TableId },

    #[error("duplicate table name: {0}")]
    DuplicateName(&'static str),

    #[error("table {name} in stage {stage} follows stage {prev}")]
    StageOrder { name: &'static str, stage: Stage, prev: Stage },
}

/// An ordered, validated set of tables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pipeline {
    tables: Vec<Table>,
}

impl Pipeline {
    /// Build a pipeline from `tables`, given in processing order.
    ///
    /// Table IDs must be strictly increasing, names unique, and the
    /// stages must appear in their declared order.
    pub fn new(tables: Vec<Table>) -> Result<Self, PipelineError> {
        if tables.is_empty() {
            return Err(PipelineError::Empty);
        }

        for (i, pair) in tables.windows(2).enumerate() {
            let (prev, cur) = (&pair[0], &pair[1]);

            if cur.id <= prev.id {
                return Err(PipelineError::NonIncreasingId {
                    name: cur.name,
                    id: cur.id,
                    prev: prev.id,
                });
            }

            if cur.stage < prev.stage {
                return Err(PipelineError::StageOrder {
                    name: cur.name,
                    stage: cur.stage,
                    prev: prev.stage,
                });
            }

            if tables[..=i].iter().any(|t| t.name == cur.name) {
                return Err(PipelineError::DuplicateName(cur.name));
            }
        }

        Ok(Self { tables })
    }

    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: TableId) -> bool {
        self.get(id).is_some()
    }

    pub fn by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// The table following `id`, if any.
    pub fn next(&self, id: TableId) -> Option<&Table> {
        let pos = self.tables.iter().position(|t| t.id == id)?;
        self.tables.get(pos + 1)
    }

    /// The entry table of `stage`.
    pub fn first_in_stage(&self, stage: Stage) -> Option<&Table> {
        self.tables.iter().find(|t| t.stage == stage)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self { tables: DEFAULT_TABLES.to_vec() }
    }
}
