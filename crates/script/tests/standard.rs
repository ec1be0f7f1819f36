use electrum_consensus::Network;
use electrum_primitives::hex::from_hex;
use electrum_script::address::{
    address_to_script_hash, address_to_script_pubkey, script_hash_hex, script_pubkey_to_address,
    AddressError,
};
use electrum_script::classify::{classify_input, input_address, InputKind};
use electrum_script::standard::{classify_script_pubkey, ScriptType};

const PK1_HEX: &str = "020102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";
const PK2_HEX: &str = "032122232425262728292a2b2c2d2e2f303132333435363738393a3b3c3d3e3f40";
const PK3_HEX: &str = "024142434445464748494a4b4c4d4e4f505152535455565758595a5b5c5d5e5f60";

/// 2-of-3 `OP_2 <pk1> <pk2> <pk3> OP_3 OP_CHECKMULTISIG`.
fn multisig_script() -> Vec<u8> {
    let mut script = vec![0x52];
    for pk in [PK1_HEX, PK2_HEX, PK3_HEX] {
        let key = from_hex(pk).expect("pubkey hex");
        script.push(key.len() as u8);
        script.extend_from_slice(&key);
    }
    script.push(0x53);
    script.push(0xae);
    script
}

fn dummy_sig(fill: u8) -> Vec<u8> {
    let mut sig = vec![0x30];
    sig.extend_from_slice(&[fill; 69]);
    sig.push(0x01);
    sig
}

fn push(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() <= 0x4b {
        script.push(data.len() as u8);
    } else {
        script.push(0x4c);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
}

#[test]
fn output_script_classification() {
    let p2pkh = from_hex("76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac").expect("script");
    assert_eq!(classify_script_pubkey(&p2pkh), ScriptType::P2Pkh);

    let p2sh = {
        let mut script = vec![0xa9, 0x14];
        script.extend_from_slice(&[0x11; 20]);
        script.push(0x87);
        script
    };
    assert_eq!(classify_script_pubkey(&p2sh), ScriptType::P2Sh);

    let p2wpkh = {
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&[0x22; 20]);
        script
    };
    assert_eq!(classify_script_pubkey(&p2wpkh), ScriptType::P2Wpkh);

    let p2wsh = {
        let mut script = vec![0x00, 0x20];
        script.extend_from_slice(&[0x33; 32]);
        script
    };
    assert_eq!(classify_script_pubkey(&p2wsh), ScriptType::P2Wsh);

    assert_eq!(classify_script_pubkey(&[0x6a, 0x01, 0x00]), ScriptType::Unknown);
}

#[test]
fn address_script_roundtrips() {
    // hash160 of the genesis coinbase pubkey.
    let p2pkh_script =
        from_hex("76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac").expect("script");
    let address = script_pubkey_to_address(&p2pkh_script, Network::Mainnet).expect("address");
    assert_eq!(address, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    assert_eq!(
        address_to_script_pubkey(&address, Network::Mainnet).expect("script"),
        p2pkh_script
    );

    // Same hash on testnet renders under the testnet version byte.
    let testnet = script_pubkey_to_address(&p2pkh_script, Network::Testnet).expect("address");
    assert_ne!(testnet, address);
    assert_eq!(
        address_to_script_pubkey(&testnet, Network::Testnet).expect("script"),
        p2pkh_script
    );

    let p2wpkh_script = from_hex("0014751e76e8199196d454941c45d1b3a323f1433bd6").expect("script");
    let address = script_pubkey_to_address(&p2wpkh_script, Network::Mainnet).expect("address");
    assert_eq!(address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    assert_eq!(
        address_to_script_pubkey(&address, Network::Mainnet).expect("script"),
        p2wpkh_script
    );

    let p2wsh_script = from_hex(
        "00201863143c14c5166804bd19203356da136c985678cd4d27a1b8c6329604903262",
    )
    .expect("script");
    let address = script_pubkey_to_address(&p2wsh_script, Network::Mainnet).expect("address");
    assert_eq!(
        address,
        "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3"
    );

    // A P2PK output has no canonical address form.
    let p2pk = {
        let mut script = vec![0x21];
        script.extend_from_slice(&from_hex(PK1_HEX).expect("pubkey"));
        script.push(0xac);
        script
    };
    assert_eq!(script_pubkey_to_address(&p2pk, Network::Mainnet), None);
}

#[test]
fn address_error_cases() {
    assert_eq!(
        address_to_script_pubkey("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb", Network::Mainnet),
        Err(AddressError::InvalidChecksum)
    );
    // Mainnet address handed to a testnet client.
    assert_eq!(
        address_to_script_pubkey("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", Network::Testnet),
        Err(AddressError::UnknownPrefix)
    );
    assert_eq!(
        address_to_script_pubkey("1A1zP0eP5QGefi2DMPTfTL5SLmv7DivfNa", Network::Mainnet),
        Err(AddressError::InvalidCharacter)
    );
}

#[test]
fn script_hash_reference_vectors() {
    // The ElectrumX documentation example: the genesis coinbase P2PK
    // output and the equivalent P2PKH script for the same key.
    let p2pk = from_hex("4104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac").expect("script");
    assert_eq!(
        script_hash_hex(&p2pk),
        "740485f380ff6379d11ef6fe7d7cdd68aea7f8bd0d953d9fdf3531fb7d531833"
    );

    assert_eq!(
        address_to_script_hash("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", Network::Mainnet)
            .expect("script hash"),
        "8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161"
    );
}

#[test]
fn classify_p2pkh_input() {
    let mut script_sig = Vec::new();
    push(&mut script_sig, &dummy_sig(0x11));
    push(&mut script_sig, &from_hex(PK1_HEX).expect("pubkey"));

    assert_eq!(classify_input(&script_sig, &[]), Some(InputKind::P2Pkh));
    assert_eq!(
        input_address(&script_sig, &[], Network::Mainnet).as_deref(),
        Some("15HAwXSZLGtE7vdTCLbuZZKphwHEnTzTgD")
    );
}

#[test]
fn classify_p2wpkh_input() {
    let witness = vec![dummy_sig(0x11), from_hex(PK1_HEX).expect("pubkey")];
    assert_eq!(classify_input(&[], &witness), Some(InputKind::P2Wpkh));
    assert_eq!(
        input_address(&[], &witness, Network::Mainnet).as_deref(),
        Some("bc1q9mhhfs3xmyt9lk9uah33kk9lgucqz9dqstwsy8")
    );
}

#[test]
fn classify_nested_p2wpkh_input() {
    // script_sig pushes the v0 key-hash redeem script, witness carries
    // signature and pubkey.
    let pubkey = from_hex(PK1_HEX).expect("pubkey");
    let redeem = from_hex("00142eef74c226d9165fd8bcede31b58bf47300115a0").expect("redeem");
    let mut script_sig = Vec::new();
    push(&mut script_sig, &redeem);
    let witness = vec![dummy_sig(0x11), pubkey];

    assert_eq!(
        classify_input(&script_sig, &witness),
        Some(InputKind::P2ShP2Wpkh)
    );
    assert_eq!(
        input_address(&script_sig, &witness, Network::Mainnet).as_deref(),
        Some("3JNi2voA12Bz1Rv7Zsf4DRJSi8ShHJVYbC")
    );
}

#[test]
fn classify_p2sh_multisig_input() {
    let redeem = multisig_script();
    let mut script_sig = vec![0x00]; // OP_0 consumed by CHECKMULTISIG's extra pop
    push(&mut script_sig, &dummy_sig(0x11));
    push(&mut script_sig, &dummy_sig(0x22));
    push(&mut script_sig, &redeem);

    assert_eq!(
        classify_input(&script_sig, &[]),
        Some(InputKind::P2ShMultisig {
            required: 2,
            total: 3
        })
    );
    assert_eq!(
        input_address(&script_sig, &[], Network::Mainnet).as_deref(),
        Some("3LnJVfZ5GkuQshwzuERW1YnEGrK5QwmpB2")
    );
}

#[test]
fn classify_p2wsh_multisig_input() {
    let witness_script = multisig_script();
    let witness = vec![
        Vec::new(),
        dummy_sig(0x11),
        dummy_sig(0x22),
        witness_script,
    ];

    assert_eq!(
        classify_input(&[], &witness),
        Some(InputKind::P2WshMultisig {
            required: 2,
            total: 3
        })
    );
    assert_eq!(
        input_address(&[], &witness, Network::Mainnet).as_deref(),
        Some("bc1qpuw440038q8fyc7nwc99dy2uvt5rj0xd6mkqr28vykkywsx2t0aq6lu7eh")
    );
}

#[test]
fn classify_nested_p2wsh_multisig_input() {
    let witness_script = multisig_script();
    let redeem =
        from_hex("00200f1d5abdf1380e9263d3760a56915c62e8393ccdd6ec01a8ec25ac4740ca5bfa")
            .expect("redeem");
    let mut script_sig = Vec::new();
    push(&mut script_sig, &redeem);
    let witness = vec![
        Vec::new(),
        dummy_sig(0x11),
        dummy_sig(0x22),
        witness_script,
    ];

    assert_eq!(
        classify_input(&script_sig, &witness),
        Some(InputKind::P2ShP2WshMultisig {
            required: 2,
            total: 3
        })
    );
    assert_eq!(
        input_address(&script_sig, &witness, Network::Mainnet).as_deref(),
        Some("35WsdP5w9emBcD8iWBDVvArTapMx9yhTYG")
    );
}
