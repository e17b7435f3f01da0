/// Unit tests for the crypto module.
///
/// Tests key loading, EIP-55 address encoding, recoverable signatures and hex helpers.
use cdp_sdk::crypto::*;
use cdp_sdk::errors::CdpError;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

fn recover_address(hash: &[u8; 32], sig: &[u8; 65]) -> [u8; 20] {
    let secp = Secp256k1::new();
    let rec_id = RecoveryId::from_i32(i32::from(sig[64] - 27)).unwrap();
    let signature = RecoverableSignature::from_compact(&sig[..64], rec_id).unwrap();
    let pubkey = secp
        .recover_ecdsa(&Message::from_digest(*hash), &signature)
        .unwrap();
    address_from_pubkey(&pubkey.serialize_uncompressed())
}

#[test]
fn test_known_key_address_derivation() {
    let mut private_key = [0u8; 32];
    private_key[31] = 1;
    let account = LocalAccount::from_private_key(&private_key).unwrap();
    assert_eq!(
        account.address(),
        "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
    );
}

#[test]
fn test_from_hex_matches_known_address() {
    let account = LocalAccount::from_hex(
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
    )
    .unwrap();
    assert_eq!(
        account.address(),
        "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
    );
}

#[test]
fn test_eip55_checksum_vectors() {
    for expected in [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ] {
        let bytes = parse_address(&expected.to_lowercase()).unwrap();
        assert_eq!(to_checksum_address(&bytes), expected);
    }
}

#[test]
fn test_load_deterministic() {
    let a = LocalAccount::from_private_key(&[0x01u8; 32]).unwrap();
    let b = LocalAccount::from_private_key(&[0x01u8; 32]).unwrap();
    assert_eq!(a.address(), b.address());
    assert_eq!(a.private_key(), [0x01u8; 32]);
}

#[test]
fn test_generate_produces_distinct_accounts() {
    let a = LocalAccount::generate();
    let b = LocalAccount::generate();
    assert_ne!(a.address_bytes(), b.address_bytes());
    assert!(a.address().starts_with("0x"));
    assert_eq!(a.address().len(), 42);
}

#[test]
fn test_invalid_private_key_rejected() {
    assert!(matches!(
        LocalAccount::from_private_key(&[0u8; 32]),
        Err(CdpError::CryptoError(_))
    ));
}

#[test]
fn test_sign_hash_recovers_signer() {
    let account = LocalAccount::from_private_key(&[0x42u8; 32]).unwrap();
    for i in 0u8..10 {
        let hash = keccak256(&[i]);
        let sig = account.sign_hash(&hash).unwrap();
        assert!(sig[64] == 27 || sig[64] == 28, "v = {}", sig[64]);
        assert_eq!(&recover_address(&hash, &sig), account.address_bytes());
    }
}

#[test]
fn test_sign_hash_deterministic() {
    let account = LocalAccount::from_private_key(&[0x07u8; 32]).unwrap();
    let hash = keccak256(b"user operation");
    assert_eq!(
        account.sign_hash(&hash).unwrap(),
        account.sign_hash(&hash).unwrap()
    );
}

#[test]
fn test_low_s_signatures() {
    // secp256k1 n / 2
    let half_n =
        hex::decode("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0").unwrap();
    let account = LocalAccount::from_private_key(&[0x11u8; 32]).unwrap();
    for i in 0u8..20 {
        let sig = account.sign_hash(&keccak256(&[i, 1])).unwrap();
        assert!(sig[32..64] <= half_n[..], "high s for message {i}");
    }
}

#[test]
fn test_sign_message_uses_eip191_prefix() {
    let account = LocalAccount::from_private_key(&[0x03u8; 32]).unwrap();
    let message = b"hello";
    let sig = account.sign_message(message).unwrap();
    assert_eq!(sig, account.sign_hash(&hash_message(message)).unwrap());
    assert_ne!(sig, account.sign_hash(&keccak256(message)).unwrap());
    assert_eq!(
        &recover_address(&hash_message(message), &sig),
        account.address_bytes()
    );
}

#[test]
fn test_keccak256_empty() {
    assert_eq!(
        hex::encode(keccak256(b"")),
        "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
    );
}

#[test]
fn test_parse_address_errors() {
    assert!(matches!(
        parse_address("0x1234"),
        Err(CdpError::UserInputValidation(_))
    ));
    assert!(matches!(
        parse_address("0xzz00000000000000000000000000000000000000"),
        Err(CdpError::UserInputValidation(_))
    ));
    assert!(parse_address("7e5f4552091a69125d5dfcb7b8c2659029395bdf").is_ok());
}

#[test]
fn test_hex_roundtrip() {
    let bytes = [0xde, 0xad, 0xbe, 0xef];
    let s = to_hex_string(&bytes);
    assert_eq!(s, "0xdeadbeef");
    assert_eq!(decode_hex(&s).unwrap(), bytes);
}

#[test]
fn test_parse_hex_32_invalid_length() {
    assert!(matches!(
        parse_hex_32("0xdeadbeef"),
        Err(CdpError::CryptoError(_))
    ));
    assert!(parse_hex_32(&"ab".repeat(32)).is_ok());
}

#[test]
fn test_debug_redacts_private_key() {
    let account = LocalAccount::from_private_key(&[0x55u8; 32]).unwrap();
    let debug = format!("{account:?}");
    assert!(debug.contains(&account.address()));
    assert!(!debug.contains(&hex::encode([0x55u8; 32])));
}
