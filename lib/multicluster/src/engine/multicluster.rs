// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Rule synthesis for cross-cluster traffic.
//!
//! Each synthesis method requests exactly one cookie and tags every
//! rule it returns with it, so a rule set can be traced back to the
//! request that produced it.

use crate::api::IpAddr;
use crate::api::IpCidr;
use crate::api::IpProto;
use crate::api::MacAddr;
use crate::cfg::MulticlusterCfg;
use ofpipe::action::Action;
use ofpipe::action::CtAction;
use ofpipe::action::CtNat;
use ofpipe::action::Goto;
use ofpipe::action::NatRange;
use ofpipe::cache::FlowCache;
use ofpipe::cookie::Allocator;
use ofpipe::cookie::Category;
use ofpipe::cookie::Cookie;
use ofpipe::ct::ZoneError;
use ofpipe::ct::ZoneMap;
use ofpipe::feature::Feature;
use ofpipe::fields::CONN_SNAT_CT_MARK;
use ofpipe::fields::FROM_TUNNEL_REG_MARK;
use ofpipe::fields::REWRITE_MAC_REG_MARK;
use ofpipe::fields::RegMark;
use ofpipe::fields::TARGET_OFPORT_FIELD;
use ofpipe::fields::TO_TUNNEL_REG_MARK;
use ofpipe::predicate::CtStateMatch;
use ofpipe::predicate::Match;
use ofpipe::rule::BuildError;
use ofpipe::rule::PRIORITY_HIGH;
use ofpipe::rule::PRIORITY_NORMAL;
use ofpipe::rule::Rule;
use ofpipe::rule::RuleSpec;
use ofpipe::table;
use ofpipe::table::Pipeline;
use ofpipe::table::Stage;
use std::sync::Arc;

pub const MULTICLUSTER_FEATURE_NAME: &str = "Multicluster";

/// The Multicluster feature module.
///
/// The cookie allocator is shared with every other feature of the
/// agent; this module only ever requests cookies of
/// [`Category::Multicluster`].
pub struct Multicluster {
    cookies: Arc<Allocator>,
    pipeline: Pipeline,
    zones: ZoneMap,
    virtual_mac: MacAddr,
    cache: FlowCache<String>,
}

impl Multicluster {
    pub fn new(
        cookies: Arc<Allocator>,
        pipeline: Pipeline,
        cfg: &MulticlusterCfg,
    ) -> Result<Self, ZoneError> {
        let zones = cfg.zone_map()?;

        Ok(Self {
            cookies,
            pipeline,
            zones,
            virtual_mac: cfg.virtual_mac,
            cache: FlowCache::new(),
        })
    }

    pub fn virtual_mac(&self) -> MacAddr {
        self.virtual_mac
    }

    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The last rule set installed for each key.
    pub fn cache(&self) -> &FlowCache<String> {
        &self.cache
    }

    fn cookie(&self) -> Cookie {
        self.cookies.request(Category::Multicluster)
    }

    /// Classify cross-cluster traffic arriving from the tunnel.
    ///
    /// Such traffic is marked as coming from the tunnel and as needing
    /// its MACs rewritten, then sent on to connection tracking.
    pub fn tunnel_classifier_flow(
        &self,
        tunnel_port: u32,
    ) -> Result<Rule, BuildError> {
        let mut spec =
            RuleSpec::new(&table::CLASSIFIER, PRIORITY_HIGH, self.cookie());
        spec.matches = vec![
            Match::InPort(tunnel_port),
            Match::EthDst(self.virtual_mac),
        ];
        spec.actions = vec![
            Action::LoadRegMark(FROM_TUNNEL_REG_MARK),
            Action::LoadRegMark(REWRITE_MAC_REG_MARK),
            Action::Goto(Goto::Stage(Stage::ConntrackState)),
        ];
        spec.finalize(&self.pipeline)
    }

    /// Forward traffic for a remote cluster through the tunnel.
    ///
    /// The first rule carries requests to the remote Service CIDR. The
    /// second carries replies to connections the remote gateway
    /// originated, which are addressed to the remote gateway IP after
    /// un-SNAT.
    pub fn l3_fwd_flows_to_remote_via_tun(
        &self,
        local_gateway_mac: MacAddr,
        peer_service_cidr: IpCidr,
        tunnel_peer: IpAddr,
        remote_gateway_ip: IpAddr,
    ) -> Result<[Rule; 2], BuildError> {
        let proto = IpProto::of_cidr(&peer_service_cidr);
        let cookie = self.cookie();

        let actions = vec![
            Action::SetEthSrc(local_gateway_mac),
            Action::SetEthDst(self.virtual_mac),
            Action::SetTunnelDst(tunnel_peer),
            Action::LoadRegMark(TO_TUNNEL_REG_MARK),
            Action::Goto(Goto::Table(table::L3_DEC_TTL.id)),
        ];

        let mut request =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie);
        request.matches =
            vec![Match::Protocol(proto), Match::IpDstNet(peer_service_cidr)];
        request.actions = actions.clone();

        let mut reply =
            RuleSpec::new(&table::L3_FORWARDING, PRIORITY_NORMAL, cookie);
        reply.matches = vec![
            Match::Protocol(proto),
            Match::CtState(CtStateMatch::rpl_trk()),
            Match::IpDst(remote_gateway_ip),
        ];
        reply.actions = actions;

        Ok([
            request.finalize(&self.pipeline)?,
            reply.finalize(&self.pipeline)?,
        ])
    }

    /// Send traffic which is headed back out the tunnel port it came in
    /// on, which the switch would otherwise drop.
    pub fn output_hairpin_tunnel_flow(
        &self,
        tunnel_port: u32,
    ) -> Result<Rule, BuildError> {
        let mut spec =
            RuleSpec::new(&table::OUTPUT, PRIORITY_HIGH, self.cookie());
        spec.matches = vec![
            Match::RegMark(RegMark::new(TARGET_OFPORT_FIELD, tunnel_port)),
            Match::InPort(tunnel_port),
        ];
        spec.actions = vec![Action::OutputInPort];
        spec.finalize(&self.pipeline)
    }

    /// Translate the source of connections to remote Services.
    ///
    /// Returns, in order:
    ///
    /// 1. SNATMark: commit new connections to `service_cidr` into the
    ///    DNAT zone, marking them for SNAT. Committing here forces the
    ///    endpoint selection of the DNAT zone to happen first.
    /// 2. SNAT: commit marked connections into the SNAT zone,
    ///    translating their source to `local_gateway_ip`.
    /// 3. UnSNAT: restore the original destination of replies addressed
    ///    to `local_gateway_ip`.
    pub fn snat_conntrack_flows(
        &self,
        service_cidr: IpCidr,
        local_gateway_ip: IpAddr,
    ) -> Result<[Rule; 3], BuildError> {
        let proto = IpProto::of(local_gateway_ip);
        let zones = self.zones.get(proto)?;
        let cookie = self.cookie();

        let mut mark =
            RuleSpec::new(&table::SNAT_MARK, PRIORITY_HIGH, cookie);
        mark.matches = vec![
            Match::Protocol(proto),
            Match::IpDstNet(service_cidr),
            Match::CtState(CtStateMatch::new_trk()),
        ];
        mark.actions = vec![Action::Ct(CtAction {
            commit: true,
            table: Some(Goto::Next),
            zone: zones.dnat,
            mark: Some(CONN_SNAT_CT_MARK),
            nat: None,
        })];

        let mut snat = RuleSpec::new(&table::SNAT, PRIORITY_NORMAL, cookie);
        snat.matches = vec![
            Match::Protocol(proto),
            Match::CtState(CtStateMatch::new_trk()),
            Match::CtMark(CONN_SNAT_CT_MARK),
            Match::IpDstNet(service_cidr),
        ];
        snat.actions = vec![Action::Ct(CtAction {
            commit: true,
            table: Some(Goto::Next),
            zone: zones.snat,
            mark: None,
            nat: Some(CtNat::Src(NatRange::single(local_gateway_ip))),
        })];

        let mut unsnat =
            RuleSpec::new(&table::UN_SNAT, PRIORITY_NORMAL, cookie);
        unsnat.matches =
            vec![Match::Protocol(proto), Match::IpDst(local_gateway_ip)];
        unsnat.actions = vec![Action::Ct(CtAction {
            commit: false,
            table: Some(Goto::Next),
            zone: zones.snat,
            mark: None,
            nat: Some(CtNat::Restore),
        })];

        Ok([
            mark.finalize(&self.pipeline)?,
            snat.finalize(&self.pipeline)?,
            unsnat.finalize(&self.pipeline)?,
        ])
    }
}

impl Feature for Multicluster {
    fn name(&self) -> &'static str {
        MULTICLUSTER_FEATURE_NAME
    }

    fn category(&self) -> Category {
        Category::Multicluster
    }

    fn init_rules(&self) -> Result<Vec<Rule>, BuildError> {
        Ok(vec![])
    }

    fn replay_rules(&self) -> Vec<Rule> {
        self.cache.get_all()
    }
}
