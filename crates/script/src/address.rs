//! Base58check and bech32 address codecs, plus scripthash derivation.

use electrum_consensus::Network;
use electrum_primitives::hash::{sha256, sha256d};
use electrum_primitives::hex;

use crate::standard::{
    classify_script_pubkey, p2pkh_script, p2sh_script, p2wpkh_script, p2wsh_script, ScriptType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    InvalidLength,
    InvalidCharacter,
    InvalidChecksum,
    UnknownPrefix,
    UnsupportedWitnessVersion,
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressError::InvalidLength => write!(f, "invalid address length"),
            AddressError::InvalidCharacter => write!(f, "invalid address character"),
            AddressError::InvalidChecksum => write!(f, "invalid address checksum"),
            AddressError::UnknownPrefix => write!(f, "unknown address prefix"),
            AddressError::UnsupportedWitnessVersion => write!(f, "unsupported witness version"),
        }
    }
}

impl std::error::Error for AddressError {}

fn version_bytes(network: Network) -> (u8, u8) {
    match network {
        Network::Mainnet => (0x00, 0x05),
        Network::Testnet => (0x6f, 0xc4),
    }
}

fn hrp(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "bc",
        Network::Testnet => "tb",
    }
}

pub fn p2pkh_address(hash: &[u8; 20], network: Network) -> String {
    let (pubkey_version, _) = version_bytes(network);
    let mut payload = Vec::with_capacity(21);
    payload.push(pubkey_version);
    payload.extend_from_slice(hash);
    base58check_encode(&payload)
}

pub fn p2sh_address(hash: &[u8; 20], network: Network) -> String {
    let (_, script_version) = version_bytes(network);
    let mut payload = Vec::with_capacity(21);
    payload.push(script_version);
    payload.extend_from_slice(hash);
    base58check_encode(&payload)
}

/// Witness v0 address for a 20-byte key hash or 32-byte script hash.
pub fn segwit_address(program: &[u8], network: Network) -> String {
    bech32_encode(hrp(network), 0, program)
}

pub fn address_to_script_pubkey(address: &str, network: Network) -> Result<Vec<u8>, AddressError> {
    let lowered = address.to_ascii_lowercase();
    if lowered.starts_with(&format!("{}1", hrp(network))) {
        let (found_hrp, version, program) = bech32_decode(address)?;
        if found_hrp != hrp(network) {
            return Err(AddressError::UnknownPrefix);
        }
        if version != 0 {
            return Err(AddressError::UnsupportedWitnessVersion);
        }
        return match program.len() {
            20 => Ok(p2wpkh_script(&program.try_into().expect("20-byte program"))),
            32 => Ok(p2wsh_script(&program.try_into().expect("32-byte program"))),
            _ => Err(AddressError::InvalidLength),
        };
    }

    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(AddressError::InvalidLength);
    }
    let (pubkey_version, script_version) = version_bytes(network);
    let hash: [u8; 20] = payload[1..].try_into().expect("21-byte payload");
    if payload[0] == pubkey_version {
        Ok(p2pkh_script(&hash))
    } else if payload[0] == script_version {
        Ok(p2sh_script(&hash))
    } else {
        Err(AddressError::UnknownPrefix)
    }
}

pub fn script_pubkey_to_address(script: &[u8], network: Network) -> Option<String> {
    match classify_script_pubkey(script) {
        ScriptType::P2Pkh => {
            let hash: [u8; 20] = script[3..23].try_into().ok()?;
            Some(p2pkh_address(&hash, network))
        }
        ScriptType::P2Sh => {
            let hash: [u8; 20] = script[2..22].try_into().ok()?;
            Some(p2sh_address(&hash, network))
        }
        ScriptType::P2Wpkh => Some(segwit_address(&script[2..22], network)),
        ScriptType::P2Wsh => Some(segwit_address(&script[2..34], network)),
        ScriptType::P2Pk | ScriptType::Unknown => None,
    }
}

/// Electrum's subscription key: byte-reversed SHA-256 of the output
/// script, lowercase hex.
pub fn script_hash_hex(script: &[u8]) -> String {
    hex::to_hex_reversed(&sha256(script))
}

pub fn address_to_script_hash(address: &str, network: Network) -> Result<String, AddressError> {
    let script = address_to_script_pubkey(address, network)?;
    Ok(script_hash_hex(&script))
}

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58check_encode(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    let checksum = sha256d(payload);
    data.extend_from_slice(&checksum[..4]);
    base58_encode(&data)
}

fn base58check_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = base58_decode(input)?;
    if bytes.len() < 4 {
        return Err(AddressError::InvalidLength);
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    let digest = sha256d(payload);
    if checksum != &digest[..4] {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

fn base58_encode(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut digits = vec![0u8];
    for byte in data {
        let mut carry = *byte as u32;
        for digit in digits.iter_mut().rev() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 58) as u8;
            carry = value / 58;
        }
        while carry > 0 {
            digits.insert(0, (carry % 58) as u8);
            carry /= 58;
        }
    }
    let leading_zeros = data.iter().take_while(|b| **b == 0u8).count();
    let mut out = String::with_capacity(leading_zeros + digits.len());
    for _ in 0..leading_zeros {
        out.push('1');
    }
    for digit in digits {
        out.push(BASE58_ALPHABET[digit as usize] as char);
    }
    out
}

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    let mut bytes = Vec::new();
    for ch in input.bytes() {
        let value = base58_value(ch).ok_or(AddressError::InvalidCharacter)? as u32;
        let mut carry = value;
        for byte in bytes.iter_mut().rev() {
            let val = (*byte as u32) * 58 + carry;
            *byte = (val & 0xff) as u8;
            carry = val >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let leading_zeros = input.bytes().take_while(|b| *b == b'1').count();
    let mut out = vec![0u8; leading_zeros];
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn base58_value(byte: u8) -> Option<u8> {
    BASE58_ALPHABET
        .iter()
        .position(|value| *value == byte)
        .map(|pos| pos as u8)
}

const BECH32_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32_GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

fn bech32_polymod(values: &[u8]) -> u32 {
    let mut checksum = 1u32;
    for value in values {
        let top = checksum >> 25;
        checksum = ((checksum & 0x01ff_ffff) << 5) ^ u32::from(*value);
        for (bit, generator) in BECH32_GENERATOR.iter().enumerate() {
            if (top >> bit) & 1 == 1 {
                checksum ^= generator;
            }
        }
    }
    checksum
}

fn bech32_hrp_expand(hrp: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(hrp.len() * 2 + 1);
    for byte in hrp.bytes() {
        out.push(byte >> 5);
    }
    out.push(0);
    for byte in hrp.bytes() {
        out.push(byte & 0x1f);
    }
    out
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc = 0u32;
    let mut bits = 0u32;
    let max = (1u32 << to) - 1;
    let mut out = Vec::new();
    for value in data {
        if u32::from(*value) >> from != 0 {
            return None;
        }
        acc = (acc << from) | u32::from(*value);
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || (acc << (to - bits)) & max != 0 {
        return None;
    }
    Some(out)
}

fn bech32_encode(hrp: &str, version: u8, program: &[u8]) -> String {
    let mut data = vec![version];
    data.extend(convert_bits(program, 8, 5, true).expect("8-to-5 with padding"));

    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(&data);
    values.extend_from_slice(&[0u8; 6]);
    let polymod = bech32_polymod(&values) ^ 1;

    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + 6);
    out.push_str(hrp);
    out.push('1');
    for value in &data {
        out.push(BECH32_CHARSET[*value as usize] as char);
    }
    for idx in 0..6 {
        let value = (polymod >> (5 * (5 - idx))) & 0x1f;
        out.push(BECH32_CHARSET[value as usize] as char);
    }
    out
}

fn bech32_decode(address: &str) -> Result<(String, u8, Vec<u8>), AddressError> {
    let has_lower = address.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = address.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::InvalidCharacter);
    }
    let address = address.to_ascii_lowercase();

    let separator = address.rfind('1').ok_or(AddressError::UnknownPrefix)?;
    if separator == 0 || separator + 7 > address.len() {
        return Err(AddressError::InvalidLength);
    }
    let (hrp, data_part) = address.split_at(separator);
    let data_part = &data_part[1..];

    let mut data = Vec::with_capacity(data_part.len());
    for ch in data_part.bytes() {
        let value = BECH32_CHARSET
            .iter()
            .position(|c| *c == ch)
            .ok_or(AddressError::InvalidCharacter)?;
        data.push(value as u8);
    }

    let mut values = bech32_hrp_expand(hrp);
    values.extend_from_slice(&data);
    if bech32_polymod(&values) != 1 {
        return Err(AddressError::InvalidChecksum);
    }

    let payload = &data[..data.len() - 6];
    let version = *payload.first().ok_or(AddressError::InvalidLength)?;
    let program =
        convert_bits(&payload[1..], 5, 8, false).ok_or(AddressError::InvalidCharacter)?;
    if program.len() < 2 || program.len() > 40 {
        return Err(AddressError::InvalidLength);
    }

    Ok((hrp.to_string(), version, program))
}
