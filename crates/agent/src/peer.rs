//! Peer records and `server.peers.subscribe` parsing.

use electrum_consensus::ChainParams;
use serde_json::Value;

use crate::transport::Transport;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PeerPorts {
    pub tcp: Option<u16>,
    pub ssl: Option<u16>,
    pub wss: Option<u16>,
}

/// A peer advertisement. Immutable after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    pub ip: String,
    pub host: String,
    pub version: Option<String>,
    pub pruning_limit: Option<u64>,
    pub ports: PeerPorts,
    pub wss_path: Option<String>,
    pub prefer_transport: Option<Transport>,
}

impl Peer {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            ip: host.clone(),
            host,
            version: None,
            pruning_limit: None,
            ports: PeerPorts::default(),
            wss_path: None,
            prefer_transport: None,
        }
    }

    /// Builds a peer from the feature tokens of a `server.peers.subscribe`
    /// entry. An empty port in `t`/`s`/`w` tokens means the network
    /// default.
    pub fn from_features(
        ip: impl Into<String>,
        host: impl Into<String>,
        features: &[String],
        params: &ChainParams,
    ) -> Self {
        let mut peer = Self::new(host);
        peer.ip = ip.into();

        for feature in features {
            let Some(tag) = feature.chars().next() else {
                continue;
            };
            let rest = &feature[tag.len_utf8()..];
            match tag {
                'v' => {
                    if !rest.is_empty() {
                        peer.version = Some(rest.to_string());
                    }
                }
                'p' => peer.pruning_limit = rest.parse().ok(),
                't' => peer.ports.tcp = parse_port(rest, params.default_tcp_port),
                's' => peer.ports.ssl = parse_port(rest, params.default_ssl_port),
                'w' => peer.ports.wss = parse_port(rest, params.default_wss_port),
                _ => {}
            }
        }

        peer
    }
}

fn parse_port(raw: &str, default: u16) -> Option<u16> {
    if raw.is_empty() {
        return Some(default);
    }
    raw.parse().ok()
}

/// Parses the full `server.peers.subscribe` result:
/// `[[ip, host, [feature, ...]], ...]`. Malformed entries are skipped.
pub fn parse_peers(value: &Value, params: &ChainParams) -> Vec<Peer> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };

    let mut peers = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(fields) = entry.as_array() else {
            continue;
        };
        let (Some(ip), Some(host)) = (
            fields.first().and_then(Value::as_str),
            fields.get(1).and_then(Value::as_str),
        ) else {
            continue;
        };
        let features: Vec<String> = fields
            .get(2)
            .and_then(Value::as_array)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        peers.push(Peer::from_features(ip, host, &features, params));
    }
    peers
}

#[cfg(test)]
mod tests {
    use super::*;
    use electrum_consensus::{chain_params, Network};
    use serde_json::json;

    #[test]
    fn feature_tokens_with_explicit_ports() {
        let params = chain_params(Network::Mainnet);
        let features = vec![
            "v1.4.2".to_string(),
            "p10000".to_string(),
            "t50001".to_string(),
            "s50002".to_string(),
            "w50004".to_string(),
        ];
        let peer = Peer::from_features("203.0.113.1", "electrum.example.org", &features, &params);

        assert_eq!(peer.version.as_deref(), Some("1.4.2"));
        assert_eq!(peer.pruning_limit, Some(10_000));
        assert_eq!(peer.ports.tcp, Some(50_001));
        assert_eq!(peer.ports.ssl, Some(50_002));
        assert_eq!(peer.ports.wss, Some(50_004));
    }

    #[test]
    fn empty_ports_take_network_defaults() {
        let mainnet = chain_params(Network::Mainnet);
        let features = vec!["t".to_string(), "s".to_string(), "w".to_string()];
        let peer = Peer::from_features("203.0.113.1", "host", &features, &mainnet);
        assert_eq!(peer.ports.tcp, Some(50_001));
        assert_eq!(peer.ports.ssl, Some(50_002));
        assert_eq!(peer.ports.wss, Some(50_004));

        let testnet = chain_params(Network::Testnet);
        let peer = Peer::from_features("203.0.113.1", "host", &features, &testnet);
        assert_eq!(peer.ports.tcp, Some(60_001));
        assert_eq!(peer.ports.ssl, Some(60_002));
        assert_eq!(peer.ports.wss, Some(60_004));
    }

    #[test]
    fn parse_peers_skips_malformed_entries() {
        let params = chain_params(Network::Mainnet);
        let value = json!([
            ["203.0.113.1", "one.example.org", ["v1.4", "s"]],
            ["203.0.113.2", "two.example.org", ["t", "junk", ""]],
            "not an entry",
            [42],
        ]);
        let peers = parse_peers(&value, &params);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].host, "one.example.org");
        assert_eq!(peers[0].version.as_deref(), Some("1.4"));
        assert_eq!(peers[0].ports.ssl, Some(50_002));
        assert_eq!(peers[0].ports.tcp, None);
        assert_eq!(peers[1].ports.tcp, Some(50_001));
        assert_eq!(peers[1].version, None);
    }
}
