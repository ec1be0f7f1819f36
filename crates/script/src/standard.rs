//! Standard script templates, classification, and a minimal decompiler.

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    P2Sh,
    P2Wpkh,
    P2Wsh,
    Unknown,
}

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if is_p2pkh(script) {
        ScriptType::P2Pkh
    } else if is_p2sh(script) {
        ScriptType::P2Sh
    } else if is_p2wpkh(script) {
        ScriptType::P2Wpkh
    } else if is_p2wsh(script) {
        ScriptType::P2Wsh
    } else if is_p2pk(script) {
        ScriptType::P2Pk
    } else {
        ScriptType::Unknown
    }
}

pub fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

pub fn is_p2wpkh(script: &[u8]) -> bool {
    script.len() == 22 && script[0] == OP_0 && script[1] == 0x14
}

pub fn is_p2wsh(script: &[u8]) -> bool {
    script.len() == 34 && script[0] == OP_0 && script[1] == 0x20
}

pub fn is_p2pk(script: &[u8]) -> bool {
    let key_len = match script.first().copied() {
        Some(len @ 33) => len,
        Some(len @ 65) => len,
        _ => return false,
    };

    let expected_len = key_len as usize + 2;
    script.len() == expected_len && script[script.len() - 1] == OP_CHECKSIG
}

pub fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

pub fn p2sh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(hash);
    script.push(OP_EQUAL);
    script
}

pub fn p2wpkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(OP_0);
    script.push(0x14);
    script.extend_from_slice(hash);
    script
}

pub fn p2wsh_script(hash: &[u8; 32]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(OP_0);
    script.push(0x20);
    script.extend_from_slice(hash);
    script
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ScriptChunk {
    Op(u8),
    Push(Vec<u8>),
}

impl ScriptChunk {
    pub fn push_data(&self) -> Option<&[u8]> {
        match self {
            Self::Push(data) => Some(data),
            Self::Op(_) => None,
        }
    }
}

/// Splits a script into opcodes and push data. Returns `None` on a
/// truncated push.
pub fn decompile(script: &[u8]) -> Option<Vec<ScriptChunk>> {
    let mut chunks = Vec::new();
    let mut cursor = 0usize;

    while cursor < script.len() {
        let opcode = script[cursor];
        cursor += 1;

        let push_len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => {
                let len = *script.get(cursor)? as usize;
                cursor += 1;
                Some(len)
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(cursor..cursor + 2)?;
                cursor += 2;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
            }
            OP_PUSHDATA4 => {
                let bytes = script.get(cursor..cursor + 4)?;
                cursor += 4;
                Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
            }
            _ => None,
        };

        match push_len {
            Some(len) => {
                let data = script.get(cursor..cursor + len)?;
                cursor += len;
                chunks.push(ScriptChunk::Push(data.to_vec()));
            }
            None => chunks.push(ScriptChunk::Op(opcode)),
        }
    }

    Some(chunks)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Multisig {
    pub required: usize,
    pub pubkeys: Vec<Vec<u8>>,
}

/// Parses `OP_m <pubkey>... OP_n OP_CHECKMULTISIG` chunk sequences.
pub fn parse_multisig(chunks: &[ScriptChunk]) -> Option<Multisig> {
    if chunks.len() < 4 {
        return None;
    }

    let required = small_number(chunks.first()?)?;
    let total = small_number(&chunks[chunks.len() - 2])?;
    if chunks[chunks.len() - 1] != ScriptChunk::Op(OP_CHECKMULTISIG) {
        return None;
    }

    let key_chunks = &chunks[1..chunks.len() - 2];
    if key_chunks.len() != total || required == 0 || required > total {
        return None;
    }

    let mut pubkeys = Vec::with_capacity(total);
    for chunk in key_chunks {
        let data = chunk.push_data()?;
        if data.len() != 33 && data.len() != 65 {
            return None;
        }
        pubkeys.push(data.to_vec());
    }

    Some(Multisig { required, pubkeys })
}

fn small_number(chunk: &ScriptChunk) -> Option<usize> {
    match chunk {
        ScriptChunk::Op(op) if (OP_1..=OP_16).contains(op) => Some((op - OP_1 + 1) as usize),
        _ => None,
    }
}
