// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Drive the Multicluster feature against a switch.
//!
//! Every rule set is cached under a key naming what it is for. Before
//! a set is handed to the installer it is diffed against the cached
//! set for the same key, and the cache is only updated once the
//! installer has accepted the change. If the installer fails, the
//! cache still describes what the switch holds.
//!
//! Rule sets cached under different keys may share rules: every
//! gateway cluster carries the same SNAT rules for the local Service
//! CIDR. A rule leaves the switch only once no cached set holds its
//! [`RuleKey`] any longer.

use crate::api::CLASSIFIER_CACHE_KEY;
use crate::api::ClusterCfg;
use crate::api::DumpCacheResp;
use crate::api::IpAddr;
use crate::api::MacAddr;
use crate::api::PeerConfig;
use crate::api::cluster_cache_key;
use crate::cfg::NodeCfg;
use crate::engine::Multicluster;
use ofpipe::ExecCtx;
use ofpipe::LogLevel;
use ofpipe::ct::ZoneError;
use ofpipe::diff::diff;
use ofpipe::feature::Feature;
use ofpipe::install::InstallError;
use ofpipe::install::RuleInstaller;
use ofpipe::rule::BuildError;
use ofpipe::rule::Rule;
use ofpipe::rule::RuleKey;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::PoisonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to build rules: {0}")]
    Build(#[from] BuildError),

    #[error("failed to install rules: {0}")]
    Install(#[from] InstallError),

    #[error("bad conntrack zones: {0}")]
    Zone(#[from] ZoneError),
}

pub struct Client<I: RuleInstaller> {
    feature: Multicluster,
    node: NodeCfg,
    installer: I,
    ectx: ExecCtx,
    // Serializes the diff, apply and cache update of each operation.
    lock: Mutex<()>,
}

impl<I: RuleInstaller> Client<I> {
    pub fn new(
        feature: Multicluster,
        node: NodeCfg,
        installer: I,
        ectx: ExecCtx,
    ) -> Self {
        Self { feature, node, installer, ectx, lock: Mutex::new(()) }
    }

    pub fn feature(&self) -> &Multicluster {
        &self.feature
    }

    pub fn node(&self) -> &NodeCfg {
        &self.node
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Install the rules classifying cross-cluster tunnel traffic.
    ///
    /// A gateway also hairpins traffic between member clusters which
    /// arrives on the tunnel and must leave on it again.
    pub fn install_classifier_flows(
        &self,
        tunnel_port: u32,
        is_gateway: bool,
    ) -> Result<(), Error> {
        let mut rules =
            vec![self.feature.tunnel_classifier_flow(tunnel_port)?];
        if is_gateway {
            rules.push(self.feature.output_hairpin_tunnel_flow(tunnel_port)?);
        }
        self.modify_flows(CLASSIFIER_CACHE_KEY.to_string(), rules)
    }

    /// Install the rules of a gateway for the remote cluster
    /// `cluster_id`.
    ///
    /// Traffic for each peer's Service CIDR leaves through the tunnel
    /// with this node's gateway MAC as source. Connections to those
    /// Services are translated to `local_gateway_ip`.
    pub fn install_gateway_flows(
        &self,
        cluster_id: &str,
        peers: &[PeerConfig],
        tunnel_peer: IpAddr,
        local_gateway_ip: IpAddr,
    ) -> Result<(), Error> {
        let mut rules =
            self.forwarding_flows(self.node.gateway_mac, peers, tunnel_peer)?;
        let snat = self
            .feature
            .snat_conntrack_flows(self.node.service_cidr, local_gateway_ip)?;
        rules.extend(snat);
        self.modify_flows(cluster_cache_key(cluster_id), rules)
    }

    /// Install the rules of a regular node for the remote cluster
    /// `cluster_id`, forwarding toward the local gateway through the
    /// tunnel.
    pub fn install_node_flows(
        &self,
        cluster_id: &str,
        peers: &[PeerConfig],
        tunnel_peer: IpAddr,
    ) -> Result<(), Error> {
        let rules = self.forwarding_flows(
            self.feature.virtual_mac(),
            peers,
            tunnel_peer,
        )?;
        self.modify_flows(cluster_cache_key(cluster_id), rules)
    }

    /// Install the rules for `cluster` appropriate to this node's role.
    pub fn install_cluster_flows(
        &self,
        cluster: &ClusterCfg,
    ) -> Result<(), Error> {
        if self.node.is_gateway {
            self.install_gateway_flows(
                &cluster.id,
                &cluster.peers,
                cluster.tunnel_peer,
                self.node.gateway_ip,
            )
        } else {
            self.install_node_flows(
                &cluster.id,
                &cluster.peers,
                cluster.tunnel_peer,
            )
        }
    }

    /// Remove every rule installed for `cluster_id`, except those
    /// another cached set still holds.
    pub fn uninstall_flows(&self, cluster_id: &str) -> Result<(), Error> {
        let key = cluster_cache_key(cluster_id);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(rules) = self.feature.cache().get(&key) else {
            self.ectx.log.log(
                LogLevel::Note,
                &format!("no rules cached for {key}, nothing to uninstall"),
            );
            return Ok(());
        };

        let held = self.keys_held_elsewhere(&key);
        let owned: Vec<Rule> =
            rules.into_iter().filter(|r| !held.contains(&r.key())).collect();
        if !owned.is_empty() {
            self.installer.delete_rules(&owned)?;
        }
        let removed = self.feature.cache().delete(&key).unwrap_or_default();

        self.ectx.log.log(
            LogLevel::Note,
            &format!(
                "uninstalled {} rules for {key}, {} still in use elsewhere",
                owned.len(),
                removed.len().saturating_sub(owned.len()),
            ),
        );
        Ok(())
    }

    /// Hand every cached rule to the installer, unchanged.
    ///
    /// This is used after the switch has lost its tables. Cookies are
    /// preserved, so the reinstalled rules are indistinguishable from
    /// the originals.
    pub fn replay_flows(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let rules = self.feature.replay_rules();
        if rules.is_empty() {
            return Ok(());
        }

        self.installer.add_rules(&rules)?;
        self.ectx.log.log(
            LogLevel::Note,
            &format!("replayed {} rules", rules.len()),
        );
        Ok(())
    }

    pub fn dump_cache(&self) -> DumpCacheResp {
        DumpCacheResp {
            feature: self.feature.name().to_string(),
            entries: self.feature.cache().dump(),
        }
    }

    fn forwarding_flows(
        &self,
        src_mac: MacAddr,
        peers: &[PeerConfig],
        tunnel_peer: IpAddr,
    ) -> Result<Vec<Rule>, BuildError> {
        let mut rules = Vec::with_capacity(peers.len() * 2);
        for peer in peers {
            rules.extend(self.feature.l3_fwd_flows_to_remote_via_tun(
                src_mac,
                peer.service_cidr,
                tunnel_peer,
                peer.gateway_ip,
            )?);
        }
        Ok(rules)
    }

    fn modify_flows(&self, key: String, rules: Vec<Rule>) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let old = self.feature.cache().get(&key).unwrap_or_default();
        let mut changes = diff(&old, &rules);
        let held = self.keys_held_elsewhere(&key);
        changes.delete.retain(|r| !held.contains(&r.key()));

        if let Err(e) = self.installer.apply(&changes) {
            self.ectx.log.log(
                LogLevel::Error,
                &format!("failed to install rules for {key}: {e}"),
            );
            return Err(e.into());
        }

        let msg = format!(
            "{key}: {} added, {} modified, {} deleted",
            changes.add.len(),
            changes.modify.len(),
            changes.delete.len(),
        );
        match self.feature.cache().put(key, rules) {
            Some(prev) => self.ectx.log.log(
                LogLevel::Note,
                &format!("{msg}, replacing {} cached rules", prev.len()),
            ),
            None => self.ectx.log.log(LogLevel::Note, &msg),
        }
        Ok(())
    }

    /// The keys of every rule cached under a key other than `key`.
    fn keys_held_elsewhere(&self, key: &str) -> BTreeSet<RuleKey> {
        let cache = self.feature.cache();
        cache
            .keys()
            .into_iter()
            .filter(|k| k.as_str() != key)
            .filter_map(|k| cache.get(&k))
            .flatten()
            .map(|r| r.key())
            .collect()
    }
}
