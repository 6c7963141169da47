// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Rules: a set of matches, an ordered list of actions, and the table,
//! priority and cookie placing them in the pipeline.
//!
//! A rule is described by a [`RuleSpec`], which is plain data, and
//! then finalized against a [`Pipeline`] into an immutable [`Rule`].
//! Finalization is the only place a rule is validated; every check the
//! switch would make at install time is made here instead, so a bad
//! rule is a synthesis bug caught before anything reaches the switch.

use crate::action::Action;
use crate::action::CtAction;
use crate::action::Goto;
use crate::api::IpProto;
use crate::api::RuleDump;
use crate::cookie::Cookie;
use crate::predicate::FlowMeta;
use crate::predicate::Match;
use crate::table::Pipeline;
use crate::table::Stage;
use crate::table::Table;
use crate::table::TableId;
use core::fmt;
use core::fmt::Display;
use thiserror::Error;

/// Rules which must win over the generic rules of a table.
pub const PRIORITY_HIGH: u16 = 210;
pub const PRIORITY_NORMAL: u16 = 200;
pub const PRIORITY_LOW: u16 = 190;
/// The table-miss rule.
pub const PRIORITY_MISS: u16 = 0;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum BuildError {
    #[error("rule in table {0} has no actions")]
    NoActions(TableId),

    #[error("table {0} is not in the pipeline")]
    UnknownTable(TableId),

    #[error("goto target table {0} is not in the pipeline")]
    UnknownGotoTarget(TableId),

    #[error("goto target stage {0} has no tables")]
    EmptyStage(Stage),

    #[error("table {0} is the last table, there is no next table")]
    NoNextTable(TableId),

    #[error("rule in table {table} jumps backward to table {target}")]
    BackwardGoto { table: TableId, target: TableId },

    #[error("match {0} requires a protocol match")]
    MissingProtocol(String),

    #[error("match {found} conflicts with protocol {proto}")]
    ProtocolMismatch { proto: IpProto, found: String },

    #[error("value does not fit its field: {0}")]
    FieldOverflow(String),

    #[error("no conntrack zone for protocol {0}")]
    NoCtZone(IpProto),
}

/// The description of a rule, prior to validation.
#[derive(Clone, Debug)]
pub struct RuleSpec {
    pub table: TableId,
    pub priority: u16,
    pub cookie: Cookie,
    pub matches: Vec<Match>,
    pub actions: Vec<Action>,
}

impl RuleSpec {
    /// Create an empty description for a rule in `table`.
    pub fn new(table: &Table, priority: u16, cookie: Cookie) -> Self {
        Self {
            table: table.id,
            priority,
            cookie,
            matches: vec![],
            actions: vec![],
        }
    }

    /// Validate the rule against `pipeline`, resolving every goto
    /// target to a concrete table.
    ///
    /// This fails when:
    ///
    /// * the rule's table is not part of the pipeline,
    /// * there are no actions,
    /// * an address match has no protocol match, or one of the other
    ///   family,
    /// * a register or conntrack mark value overflows its field,
    /// * a goto target can't be resolved, or resolves to a table
    ///   earlier than the rule's own.
    pub fn finalize(self, pipeline: &Pipeline) -> Result<Rule, BuildError> {
        let table = *pipeline
            .get(self.table)
            .ok_or(BuildError::UnknownTable(self.table))?;

        if self.actions.is_empty() {
            return Err(BuildError::NoActions(table.id));
        }

        let matches: Vec<Match> =
            self.matches.into_iter().map(Match::normalized).collect();
        check_matches(&matches)?;

        let mut actions = self.actions;
        for action in actions.iter_mut() {
            check_action_fields(action)?;

            if let Some(goto) = action.goto_target_mut() {
                let target = resolve_goto(pipeline, &table, goto)?;
                *goto = Goto::Table(target);
            }
        }

        Ok(Rule {
            table,
            priority: self.priority,
            cookie: self.cookie,
            matches,
            actions,
        })
    }
}

fn check_matches(matches: &[Match]) -> Result<(), BuildError> {
    let proto = matches.iter().find_map(|m| match m {
        Match::Protocol(proto) => Some(*proto),
        _ => None,
    });

    for m in matches {
        if let Some(family) = m.family() {
            match proto {
                None => return Err(BuildError::MissingProtocol(m.to_string())),
                Some(proto) if proto != family => {
                    return Err(BuildError::ProtocolMismatch {
                        proto,
                        found: m.to_string(),
                    });
                }
                _ => (),
            }
        }

        let fits = match m {
            Match::RegMark(mark) => mark.fits(),
            Match::CtMark(mark) => mark.fits(),
            _ => true,
        };

        if !fits {
            return Err(BuildError::FieldOverflow(m.to_string()));
        }
    }

    Ok(())
}

fn check_action_fields(action: &Action) -> Result<(), BuildError> {
    let fits = match action {
        Action::LoadRegMark(mark) => mark.fits(),
        Action::Ct(CtAction { mark: Some(mark), .. }) => mark.fits(),
        _ => true,
    };

    if !fits {
        return Err(BuildError::FieldOverflow(action.to_string()));
    }

    Ok(())
}

fn resolve_goto(
    pipeline: &Pipeline,
    table: &Table,
    goto: &Goto,
) -> Result<TableId, BuildError> {
    let target = match goto {
        Goto::Table(id) => {
            pipeline.get(*id).ok_or(BuildError::UnknownGotoTarget(*id))?
        }

        Goto::Stage(stage) => pipeline
            .first_in_stage(*stage)
            .ok_or(BuildError::EmptyStage(*stage))?,

        Goto::Next => {
            pipeline.next(table.id).ok_or(BuildError::NoNextTable(table.id))?
        }
    };

    if target.id < table.id {
        return Err(BuildError::BackwardGoto {
            table: table.id,
            target: target.id,
        });
    }

    Ok(target.id)
}

/// The identity of a rule as the switch sees it: a table, a priority
/// and a match set. Installing a rule with the key of an installed
/// rule replaces it.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RuleKey {
    pub table: TableId,
    pub priority: u16,
    pub matches: String,
}

impl Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "table={}, priority={}", self.table, self.priority)?;
        if !self.matches.is_empty() {
            write!(f, ",{}", self.matches)?;
        }
        Ok(())
    }
}

/// A finalized rule.
///
/// Every goto target of a finalized rule is a [`Goto::Table`] naming a
/// table of the pipeline it was finalized against.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    table: Table,
    priority: u16,
    cookie: Cookie,
    matches: Vec<Match>,
    actions: Vec<Action>,
}

impl Rule {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn cookie(&self) -> Cookie {
        self.cookie
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            table: self.table.id,
            priority: self.priority,
            matches: self.matches_str(),
        }
    }

    /// Do the two rules match and act the same, ignoring cookies?
    pub fn same_content(&self, other: &Rule) -> bool {
        self.table.id == other.table.id
            && self.priority == other.priority
            && self.matches == other.matches
            && self.actions == other.actions
    }

    pub fn is_match(&self, meta: &FlowMeta) -> bool {
        self.matches.iter().all(|m| m.is_match(meta))
    }

    /// The first conntrack action, if any.
    pub fn ct(&self) -> Option<&CtAction> {
        self.actions.iter().find_map(|a| match a {
            Action::Ct(ct) => Some(ct),
            _ => None,
        })
    }

    /// The table processing continues in, if any.
    pub fn goto_table(&self) -> Option<TableId> {
        self.actions.iter().find_map(|a| match a.goto_target() {
            Some(Goto::Table(id)) => Some(*id),
            _ => None,
        })
    }

    fn matches_str(&self) -> String {
        join(&self.matches)
    }

    fn actions_str(&self) -> String {
        join(&self.actions)
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cookie={}, {} actions={}",
            self.cookie,
            self.key(),
            self.actions_str()
        )
    }
}

impl From<&Rule> for RuleDump {
    fn from(rule: &Rule) -> Self {
        let category =
            rule.cookie.category().map_or("Unknown", |c| c.name()).to_string();

        RuleDump {
            table: rule.table.name.to_string(),
            table_id: rule.table.id.0,
            priority: rule.priority,
            cookie: rule.cookie.raw(),
            category,
            matches: rule.matches.iter().map(ToString::to_string).collect(),
            actions: rule.actions.iter().map(ToString::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::IpAddr;
    use crate::api::IpCidr;
    use crate::cookie::Category;
    use crate::fields::PKT_SOURCE_FIELD;
    use crate::fields::RegMark;
    use crate::fields::TO_TUNNEL_REG_MARK;
    use crate::table;

    fn cookie() -> Cookie {
        Cookie::new(1, Category::Multicluster, 1)
    }

    fn cidr() -> IpCidr {
        "10.96.0.0/12".parse().unwrap()
    }

    #[test]
    fn zero_actions_rejected() {
        let p = Pipeline::default();
        let spec =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie());
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::NoActions(table::L3_FORWARDING.id))
        );
    }

    #[test]
    fn unknown_goto_rejected() {
        let p = Pipeline::default();
        let mut spec =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie());
        spec.actions.push(Action::Goto(Goto::Table(TableId(45))));
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::UnknownGotoTarget(TableId(45)))
        );
    }

    #[test]
    fn unknown_ct_resubmit_rejected() {
        let p = Pipeline::default();
        let mut spec = RuleSpec::new(&table::SNAT, PRIORITY_NORMAL, cookie());
        spec.actions.push(Action::Ct(CtAction {
            commit: true,
            table: Some(Goto::Table(TableId(99))),
            zone: 1,
            mark: None,
            nat: None,
        }));
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::UnknownGotoTarget(TableId(99)))
        );
    }

    #[test]
    fn cidr_host_bits_share_key() {
        let p = Pipeline::default();
        let build = |dst: &str| {
            let t = &table::L3_FORWARDING;
            let mut spec = RuleSpec::new(t, PRIORITY_NORMAL, cookie());
            spec.matches = vec![
                Match::Protocol(IpProto::Ipv4),
                Match::IpDstNet(dst.parse().unwrap()),
            ];
            spec.actions.push(Action::Output(7));
            spec.finalize(&p).unwrap()
        };

        let loose = build("10.96.1.0/12");
        let exact = build("10.96.0.0/12");
        assert_eq!(loose.key(), exact.key());
        assert_eq!(loose.matches(), exact.matches());
        assert!(loose.to_string().contains("nw_dst=10.96.0.0/12"));
    }

    #[test]
    fn unknown_table_rejected() {
        let p = Pipeline::new(vec![table::CLASSIFIER, table::OUTPUT]).unwrap();
        let mut spec = RuleSpec::new(&table::SNAT, PRIORITY_NORMAL, cookie());
        spec.actions.push(Action::OutputInPort);
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::UnknownTable(table::SNAT.id))
        );
    }

    #[test]
    fn goto_resolution() {
        let p = Pipeline::default();

        let mut spec =
            RuleSpec::new(&table::CLASSIFIER, PRIORITY_HIGH, cookie());
        spec.actions.push(Action::Goto(Goto::Stage(Stage::ConntrackState)));
        let rule = spec.finalize(&p).unwrap();
        assert_eq!(rule.goto_table(), Some(table::UN_SNAT.id));
        assert_eq!(
            rule.actions(),
            &[Action::Goto(Goto::Table(table::UN_SNAT.id))]
        );

        let mut spec =
            RuleSpec::new(&table::SNAT_MARK, PRIORITY_HIGH, cookie());
        spec.actions.push(Action::Ct(CtAction {
            commit: true,
            table: Some(Goto::Next),
            zone: 1,
            mark: None,
            nat: None,
        }));
        let rule = spec.finalize(&p).unwrap();
        assert_eq!(
            rule.ct().and_then(|ct| ct.table),
            Some(Goto::Table(table::SNAT.id))
        );
    }

    #[test]
    fn bad_goto_resolution() {
        let p = Pipeline::new(vec![table::CLASSIFIER, table::OUTPUT]).unwrap();

        let mut spec =
            RuleSpec::new(&table::CLASSIFIER, PRIORITY_HIGH, cookie());
        spec.actions.push(Action::Goto(Goto::Stage(Stage::Routing)));
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::EmptyStage(Stage::Routing))
        );

        let mut spec = RuleSpec::new(&table::OUTPUT, PRIORITY_HIGH, cookie());
        spec.actions.push(Action::Goto(Goto::Next));
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::NoNextTable(table::OUTPUT.id))
        );
    }

    #[test]
    fn backward_goto_rejected() {
        let p = Pipeline::default();
        let mut spec = RuleSpec::new(&table::SNAT, PRIORITY_NORMAL, cookie());
        spec.actions.push(Action::Goto(Goto::Table(table::CLASSIFIER.id)));
        assert_eq!(
            spec.finalize(&p),
            Err(BuildError::BackwardGoto {
                table: table::SNAT.id,
                target: table::CLASSIFIER.id,
            })
        );

        // Resubmitting to the rule's own table is allowed.
        let mut spec = RuleSpec::new(&table::SNAT, PRIORITY_NORMAL, cookie());
        spec.actions.push(Action::Goto(Goto::Table(table::SNAT.id)));
        assert!(spec.finalize(&p).is_ok());
    }

    #[test]
    fn protocol_prerequisites() {
        let p = Pipeline::default();

        let mut spec =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie());
        spec.matches.push(Match::IpDstNet(cidr()));
        spec.actions.push(Action::Goto(Goto::Next));
        assert_eq!(
            spec.clone().finalize(&p),
            Err(BuildError::MissingProtocol("nw_dst=10.96.0.0/12".into()))
        );

        spec.matches.insert(0, Match::Protocol(IpProto::Ipv6));
        assert!(matches!(
            spec.clone().finalize(&p),
            Err(BuildError::ProtocolMismatch { proto: IpProto::Ipv6, .. })
        ));

        spec.matches[0] = Match::Protocol(IpProto::Ipv4);
        assert!(spec.finalize(&p).is_ok());
    }

    #[test]
    fn field_overflow_rejected() {
        let p = Pipeline::default();
        let mut spec =
            RuleSpec::new(&table::CLASSIFIER, PRIORITY_HIGH, cookie());
        let mark = RegMark::new(PKT_SOURCE_FIELD, 16);
        spec.actions.push(Action::LoadRegMark(mark));
        assert!(matches!(
            spec.finalize(&p),
            Err(BuildError::FieldOverflow(_))
        ));
    }

    #[test]
    fn identical_specs_are_independent_rules() {
        let p = Pipeline::default();
        let gw: IpAddr = "10.0.0.2".parse().unwrap();
        let build = |seq| {
            let mut spec = RuleSpec::new(
                &table::L3_FORWARDING,
                PRIORITY_NORMAL,
                Cookie::new(1, Category::Multicluster, seq),
            );
            spec.matches.push(Match::Protocol(IpProto::Ipv4));
            spec.matches.push(Match::IpDst(gw));
            spec.actions.push(Action::LoadRegMark(TO_TUNNEL_REG_MARK));
            spec.actions.push(Action::Goto(Goto::Next));
            spec.finalize(&p).unwrap()
        };

        let a = build(1);
        let b = build(2);
        assert_ne!(a, b);
        assert!(a.same_content(&b));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn rendering_and_dump() {
        let p = Pipeline::default();
        let mut spec =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie());
        spec.matches.push(Match::Protocol(IpProto::Ipv4));
        spec.matches.push(Match::IpDstNet(cidr()));
        spec.actions.push(Action::LoadRegMark(TO_TUNNEL_REG_MARK));
        spec.actions.push(Action::Goto(Goto::Next));
        let rule = spec.finalize(&p).unwrap();

        assert_eq!(
            rule.to_string(),
            "cookie=0x1090000000001, table=40, priority=200,\
             ip,nw_dst=10.96.0.0/12 \
             actions=set_field:0x10/0xf0->reg0,goto_table:41"
        );

        let dump = RuleDump::from(&rule);
        assert_eq!(dump.table, "L3Forwarding");
        assert_eq!(dump.table_id, 40);
        assert_eq!(dump.category, "Multicluster");
        assert_eq!(dump.matches, vec!["ip", "nw_dst=10.96.0.0/12"]);
        assert_eq!(dump.actions.len(), 2);
    }
}
