// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod installer;

// Let's make our lives easier and pub use a bunch of stuff.
pub use installer::InstallRecord;
pub use installer::RecordingInstaller;
pub use multicluster::api::CLASSIFIER_CACHE_KEY;
pub use multicluster::api::ClusterCfg;
pub use multicluster::api::GLOBAL_VIRTUAL_MAC;
pub use multicluster::api::IpAddr;
pub use multicluster::api::IpCidr;
pub use multicluster::api::IpProto;
pub use multicluster::api::MacAddr;
pub use multicluster::api::PeerConfig;
pub use multicluster::api::cluster_cache_key;
pub use multicluster::cfg::MulticlusterCfg;
pub use multicluster::cfg::NodeCfg;
pub use multicluster::client::Client;
pub use multicluster::client::Error;
pub use multicluster::engine::Multicluster;
pub use ofpipe::ExecCtx;
pub use ofpipe::PrintlnLog;
pub use ofpipe::action::Action;
pub use ofpipe::action::CtAction;
pub use ofpipe::action::CtNat;
pub use ofpipe::action::Goto;
pub use ofpipe::cookie::Allocator;
pub use ofpipe::cookie::Category;
pub use ofpipe::cookie::Cookie;
pub use ofpipe::cookie::CookieMatch;
pub use ofpipe::feature::Feature;
pub use ofpipe::fields;
pub use ofpipe::install::InstallError;
pub use ofpipe::install::InstallOp;
pub use ofpipe::install::RuleInstaller;
pub use ofpipe::predicate::CtStateFlags;
pub use ofpipe::predicate::CtStateMatch;
pub use ofpipe::predicate::FlowMeta;
pub use ofpipe::predicate::Match;
pub use ofpipe::rule::BuildError;
pub use ofpipe::rule::PRIORITY_HIGH;
pub use ofpipe::rule::PRIORITY_NORMAL;
pub use ofpipe::rule::Rule;
pub use ofpipe::rule::RuleKey;
pub use ofpipe::table;
pub use ofpipe::table::Pipeline;
pub use ofpipe::table::Table;
pub use std::sync::Arc;

pub const ROUND: u16 = 1;
pub const TUNNEL_PORT: u32 = 7;
pub const LOCAL_GW_IP: &str = "10.0.0.1";
pub const LOCAL_GW_MAC: MacAddr =
    MacAddr::from_const([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const SERVICE_CIDR: &str = "10.96.0.0/12";
pub const TUNNEL_PEER: &str = "192.168.1.5";
pub const REMOTE_GW_IP: &str = "10.0.0.2";

// A second remote Service range behind the same tunnel peer.
pub const SERVICE_CIDR_2: &str = "10.112.0.0/12";
pub const REMOTE_GW_IP_2: &str = "10.0.0.3";

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn cidr(s: &str) -> IpCidr {
    s.parse().unwrap()
}

pub fn node_cfg(is_gateway: bool) -> NodeCfg {
    NodeCfg {
        gateway_mac: LOCAL_GW_MAC,
        gateway_ip: ip(LOCAL_GW_IP),
        service_cidr: cidr(SERVICE_CIDR),
        tunnel_port: TUNNEL_PORT,
        is_gateway,
    }
}

pub fn peer() -> PeerConfig {
    PeerConfig {
        service_cidr: cidr(SERVICE_CIDR),
        gateway_ip: ip(REMOTE_GW_IP),
    }
}

pub fn peers() -> Vec<PeerConfig> {
    vec![
        peer(),
        PeerConfig {
            service_cidr: cidr(SERVICE_CIDR_2),
            gateway_ip: ip(REMOTE_GW_IP_2),
        },
    ]
}

pub fn feature(cookies: Arc<Allocator>) -> Multicluster {
    Multicluster::new(cookies, Pipeline::default(), &MulticlusterCfg::default())
        .unwrap()
}

pub fn client_with(
    cookies: Arc<Allocator>,
    is_gateway: bool,
) -> Client<RecordingInstaller> {
    Client::new(
        feature(cookies),
        node_cfg(is_gateway),
        RecordingInstaller::new(),
        ExecCtx { log: Box::new(PrintlnLog) },
    )
}

pub fn client(is_gateway: bool) -> Client<RecordingInstaller> {
    client_with(Arc::new(Allocator::new(ROUND)), is_gateway)
}

/// The rules of `rules` which live in `table`, in order.
pub fn rules_in_table<'a>(rules: &'a [Rule], table: &Table) -> Vec<&'a Rule> {
    rules.iter().filter(|r| r.table().id == table.id).collect()
}

/// The conntrack zone of the first conntrack action of `rule`.
pub fn ct_zone(rule: &Rule) -> u16 {
    rule.ct().map(|ct| ct.zone).unwrap()
}
