// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

pub use ofpipe_api::*;
use serde::Deserialize;
use serde::Serialize;

/// The virtual MAC reserved for cross-cluster tunnel traffic.
pub const GLOBAL_VIRTUAL_MAC: MacAddr =
    MacAddr::from_const([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xF0]);

/// The replay cache key of the classifier rules.
pub const CLASSIFIER_CACHE_KEY: &str = "multicluster-classifier";

/// The replay cache key of the rules toward one remote cluster.
pub fn cluster_cache_key(cluster_id: &str) -> String {
    format!("cluster_{cluster_id}")
}

/// What route discovery tells us about one remote cluster's gateway.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    /// The Service ClusterIP range of the remote cluster.
    pub service_cidr: IpCidr,
    /// The IP of the remote cluster's gateway.
    pub gateway_ip: IpAddr,
}

/// A remote cluster reachable through one tunnel endpoint.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterCfg {
    pub id: String,
    /// The underlay address of the tunnel endpoint.
    pub tunnel_peer: IpAddr,
    #[serde(default, rename = "peer")]
    pub peers: Vec<PeerConfig>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_keys() {
        assert_eq!(cluster_cache_key("east"), "cluster_east");
        assert_eq!(GLOBAL_VIRTUAL_MAC.to_string(), "aa:bb:cc:dd:ee:f0");
    }

    #[test]
    fn peer_from_json() {
        let peer: PeerConfig = serde_json::from_str(
            r#"{"service_cidr": "10.96.0.0/12", "gateway_ip": "10.0.0.2"}"#,
        )
        .unwrap();
        assert_eq!(peer.service_cidr, "10.96.0.0/12".parse().unwrap());
        assert_eq!(peer.gateway_ip, "10.0.0.2".parse::<IpAddr>().unwrap());
    }
}
