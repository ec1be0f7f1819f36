//! Transport variants and deterministic selection.

use electrum_consensus::ChainParams;
use electrum_rpc::Endpoint;

use crate::error::AgentError;
use crate::peer::Peer;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Transport {
    Tcp,
    Ssl,
    Wss,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ssl => "ssl",
            Self::Wss => "wss",
        }
    }
}

/// Client-wide transport configuration. `None` disables the tunneled
/// transport entirely.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub tcp_proxy_url: Option<String>,
    pub ssl_proxy_url: Option<String>,
}

fn usable(peer: &Peer, config: &ClientConfig, transport: Transport) -> bool {
    match transport {
        Transport::Wss => peer.ports.wss.is_some(),
        Transport::Ssl => peer.ports.ssl.is_some() && config.ssl_proxy_url.is_some(),
        Transport::Tcp => peer.ports.tcp.is_some() && config.tcp_proxy_url.is_some(),
    }
}

/// Deterministic constructor-time choice: the peer's preference when it
/// is usable, otherwise WSS (direct), SSL (proxied), TCP (proxied).
pub fn select_transport(peer: &Peer, config: &ClientConfig) -> Result<Transport, AgentError> {
    if let Some(preferred) = peer.prefer_transport {
        if usable(peer, config, preferred) {
            return Ok(preferred);
        }
    }
    for transport in [Transport::Wss, Transport::Ssl, Transport::Tcp] {
        if usable(peer, config, transport) {
            return Ok(transport);
        }
    }
    Err(AgentError::NoSuitableTransport)
}

/// Builds the endpoint a connector should dial. WSS reaches the peer
/// directly; SSL and TCP go through the configured tunneling proxy with
/// a `<network>:<host>` routing token.
pub fn endpoint_for(
    peer: &Peer,
    transport: Transport,
    config: &ClientConfig,
    params: &ChainParams,
) -> Result<Endpoint, AgentError> {
    match transport {
        Transport::Wss => {
            let port = peer.ports.wss.ok_or(AgentError::NoSuitableTransport)?;
            let path = match peer.wss_path.as_deref() {
                Some(path) if !path.is_empty() => {
                    if path.starts_with('/') {
                        path.to_string()
                    } else {
                        format!("/{path}")
                    }
                }
                _ => String::new(),
            };
            Ok(Endpoint::direct(format!(
                "wss://{}:{port}{path}",
                peer.host
            )))
        }
        Transport::Ssl => {
            let proxy = config
                .ssl_proxy_url
                .as_deref()
                .ok_or(AgentError::NoSuitableTransport)?;
            Ok(Endpoint::tunneled(
                proxy,
                format!("{}:{}", params.network.as_str(), peer.host),
            ))
        }
        Transport::Tcp => {
            let proxy = config
                .tcp_proxy_url
                .as_deref()
                .ok_or(AgentError::NoSuitableTransport)?;
            Ok(Endpoint::tunneled(
                proxy,
                format!("{}:{}", params.network.as_str(), peer.host),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerPorts;
    use electrum_consensus::{chain_params, Network};

    fn peer_with_ports(tcp: Option<u16>, ssl: Option<u16>, wss: Option<u16>) -> Peer {
        Peer {
            ip: "203.0.113.1".to_string(),
            host: "electrum.example.org".to_string(),
            version: None,
            pruning_limit: None,
            ports: PeerPorts { tcp, ssl, wss },
            wss_path: None,
            prefer_transport: None,
        }
    }

    fn proxied_config() -> ClientConfig {
        ClientConfig {
            tcp_proxy_url: Some("wss://proxy.example/tcp".to_string()),
            ssl_proxy_url: Some("wss://proxy.example/ssl".to_string()),
        }
    }

    #[test]
    fn prefers_wss_then_ssl_then_tcp() {
        let config = proxied_config();
        let all = peer_with_ports(Some(50001), Some(50002), Some(50004));
        assert_eq!(select_transport(&all, &config), Ok(Transport::Wss));

        let no_wss = peer_with_ports(Some(50001), Some(50002), None);
        assert_eq!(select_transport(&no_wss, &config), Ok(Transport::Ssl));

        let tcp_only = peer_with_ports(Some(50001), None, None);
        assert_eq!(select_transport(&tcp_only, &config), Ok(Transport::Tcp));
    }

    #[test]
    fn preference_wins_when_usable() {
        let config = proxied_config();
        let mut peer = peer_with_ports(Some(50001), Some(50002), Some(50004));
        peer.prefer_transport = Some(Transport::Tcp);
        assert_eq!(select_transport(&peer, &config), Ok(Transport::Tcp));

        // Preferred port missing: fall back to the ladder.
        peer.ports.tcp = None;
        assert_eq!(select_transport(&peer, &config), Ok(Transport::Wss));
    }

    #[test]
    fn disabled_proxies_remove_transports() {
        let peer = peer_with_ports(Some(50001), Some(50002), None);
        let no_proxies = ClientConfig::default();
        assert_eq!(
            select_transport(&peer, &no_proxies),
            Err(AgentError::NoSuitableTransport)
        );
    }

    #[test]
    fn endpoints_carry_tunnel_tokens() {
        let params = chain_params(Network::Mainnet);
        let config = proxied_config();
        let mut peer = peer_with_ports(Some(50001), Some(50002), Some(50004));
        peer.wss_path = Some("ws".to_string());

        let wss = endpoint_for(&peer, Transport::Wss, &config, &params).expect("wss");
        assert_eq!(wss.url, "wss://electrum.example.org:50004/ws");
        assert_eq!(wss.tunnel_token, None);

        let ssl = endpoint_for(&peer, Transport::Ssl, &config, &params).expect("ssl");
        assert_eq!(ssl.url, "wss://proxy.example/ssl");
        assert_eq!(
            ssl.tunnel_token.as_deref(),
            Some("mainnet:electrum.example.org")
        );

        let testnet = chain_params(Network::Testnet);
        let tcp = endpoint_for(&peer, Transport::Tcp, &config, &testnet).expect("tcp");
        assert_eq!(
            tcp.tunnel_token.as_deref(),
            Some("testnet:electrum.example.org")
        );
    }
}
