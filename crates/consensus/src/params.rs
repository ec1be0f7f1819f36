//! Per-network chain parameters.

use crate::Hash256;

pub const MAINNET_GENESIS_HASH: &str =
    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
pub const TESTNET_GENESIS_HASH: &str =
    "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Token prefix understood by the tunneling proxy.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Self::Mainnet),
            "testnet" | "test" => Some(Self::Testnet),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub genesis_hash: Hash256,
    pub default_tcp_port: u16,
    pub default_ssl_port: u16,
    pub default_wss_port: u16,
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => ChainParams {
            network,
            genesis_hash: hash256_from_hex(MAINNET_GENESIS_HASH).expect("mainnet genesis"),
            default_tcp_port: 50001,
            default_ssl_port: 50002,
            default_wss_port: 50004,
        },
        Network::Testnet => ChainParams {
            network,
            genesis_hash: hash256_from_hex(TESTNET_GENESIS_HASH).expect("testnet genesis"),
            default_tcp_port: 60001,
            default_ssl_port: 60002,
            default_wss_port: 60004,
        },
    }
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "invalid hex length"),
            HexError::InvalidHex => write!(f, "invalid hex digit"),
        }
    }
}

impl std::error::Error for HexError {}

/// Parses a big-endian hex hash into internal little-endian bytes.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let hex = input.trim();
    if hex.len() != 64 {
        return Err(HexError::InvalidLength);
    }

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte =
            u8::from_str_radix(&hex[start..start + 2], 16).map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

/// Renders internal little-endian bytes as the big-endian hex display form.
pub fn hash256_to_hex(hash: &Hash256) -> String {
    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        out.push(hex_digit(byte >> 4));
        out.push(hex_digit(byte & 0x0f));
    }
    out
}

fn hex_digit(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        _ => (b'a' + (value - 10)) as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_roundtrip() {
        let hash = hash256_from_hex(MAINNET_GENESIS_HASH).expect("parse genesis");
        assert_eq!(hash256_to_hex(&hash), MAINNET_GENESIS_HASH);
        // Internal order is little-endian: display leading zeros land at the tail.
        assert_eq!(hash[31], 0x00);
        assert_eq!(hash[0], 0x6f);
    }

    #[test]
    fn genesis_matches_hex_parse() {
        let params = chain_params(Network::Mainnet);
        let parsed = hash256_from_hex(MAINNET_GENESIS_HASH).expect("parse genesis");
        assert_eq!(params.genesis_hash, parsed);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(
            hash256_from_hex("abcd"),
            Err(HexError::InvalidLength)
        ));
        let mut bad = String::from(MAINNET_GENESIS_HASH);
        bad.replace_range(0..1, "x");
        assert!(matches!(hash256_from_hex(&bad), Err(HexError::InvalidHex)));
    }

    #[test]
    fn default_ports_per_network() {
        let mainnet = chain_params(Network::Mainnet);
        assert_eq!(mainnet.default_tcp_port, 50001);
        assert_eq!(mainnet.default_wss_port, 50004);
        let testnet = chain_params(Network::Testnet);
        assert_eq!(testnet.default_ssl_port, 60002);
        assert_eq!(testnet.network.as_str(), "testnet");
    }
}
