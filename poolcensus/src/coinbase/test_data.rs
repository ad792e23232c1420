//! Real pool traffic and synthetic coinbase builders for tests.
//!
//! `public_pool_job` is a `mining.notify` captured from Public-Pool while a
//! Bitaxe was mining against it. The coinbase pays a single P2WSH output and
//! carries a witness commitment, which makes it a good end-to-end fixture
//! for decoding and classification.

use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_2};
use bitcoin::script::Builder;
use bitcoin::{Address, Amount, Network, PubkeyHash, PublicKey, ScriptBuf, TxOut};

// [2025-06-19T14:45:28.918] stratum_task: rx:
// {"id":null,"method":"mining.notify","params":["875b4b7",
//  "6b6455fd6db962c101f2d4fc0d67f4a3bc96391d000152960000000000000000",
//  "02000000010000...ffffffff170330c30d5075626c69632d506f6f6c",
//  "ffffffff02e5b5c612...",
//  [12 merkle branches], "20000000", "17023a04", "685468d7", false]}
pub mod public_pool_job {
    use serde_json::{json, Value};

    pub const JOB_ID: &str = "875b4b7";

    pub const PREV_HASH: &str = "6b6455fd6db962c101f2d4fc0d67f4a3bc96391d000152960000000000000000";

    pub const COINBASE1: &str = "02000000010000000000000000000000000000000000000000000000000000000000000000ffffffff170330c30d5075626c69632d506f6f6c";

    pub const COINBASE2: &str = "ffffffff02e5b5c61200000000220020984a77c289084ff2d434c316bdada021c6c183d507c8a20d3b159b09ac02fe280000000000000000266a24aa21a9edb98ee50410ed4abd48401ed484fc874409d086a3faf0816136a8ad6168314c5800000000";

    /// The scriptSig holds 8 bytes of extranonce after the height and tag.
    pub const EXTRANONCE1: &str = "f000000f";
    pub const EXTRANONCE2_SIZE: usize = 4;

    pub const BLOCK_HEIGHT: u32 = 901_936;

    pub const PAYOUT_SATS: u64 = 315_012_581;
    pub const PAYOUT_ADDRESS: &str =
        "bc1qnp980s5fpp8l94p5cvttmtdqy8rvrq74qly2yrfmzkdsntqzlc5qkc4rkq";

    pub const MERKLE_BRANCHES: [&str; 12] = [
        "21af451ddb51e887ff1feb5592b87290098565035eb8500031aedcc776d4e72a",
        "c5af269519c809a9546d5a58ca6445d3dbb80cb7045448ecc48309af034da8f8",
        "fb9f8f9959f6bb0ceb63fa53aed1d5a615c6b6d3f50a468ea89a45a1234bda74",
        "a4f4fee8e5fc19ca8d93e67b9236c37ddb864982010434745c0abfe9b914980c",
        "33092206642744fbe5499c3e621cd5c6b52733e54fbebd869f070082b807f740",
        "3b857e32c5cff4864efab967b9a456ca03b2167ab96bd9076ce294c8a67a7fe2",
        "881a07cd881d0c3e590b4b090ea8d58e1439dc56c63686f7de23c47045441e30",
        "315e4dbcc8e7b1c9d594a73978268791880dddb2c26eec8e75768668dad99d80",
        "69952b77c632be16b1ac7ac7048f13d4e962b2e215d79a343f01e6e281d7c304",
        "fc63eb4392c4d6c6d689788875fca35143fdcd4f4a82e8698e0e441751a70b4a",
        "09e419bbe20aa3a7640f1b91f50599ceddff899e90d3f18951ad5418c4850a6b",
        "004978aa346b4f1880bcadb3ca3792d771ee6aeca427f61e74baba44b75cfb88",
    ];

    pub fn notify_params() -> Value {
        json!([
            JOB_ID,
            PREV_HASH,
            COINBASE1,
            COINBASE2,
            MERKLE_BRANCHES.to_vec(),
            "20000000",
            "17023a04",
            "685468d7",
            false
        ])
    }
}

/// Extranonce1 used with [`coinbase_parts`].
pub const SYNTHETIC_EXTRANONCE1: &str = "0a0b0c0d";
pub const SYNTHETIC_EXTRANONCE2_SIZE: usize = 4;
pub const SYNTHETIC_HEIGHT: u32 = 880_000;

/// Split a version-1 coinbase paying `outputs` into Stratum fragments.
///
/// The scriptSig is a 3-byte BIP34 height push, then the extranonce space,
/// then `tag`, so `tag` appears at the start of coinbase2.
pub fn coinbase_parts(outputs: Vec<TxOut>, tag: &[u8]) -> (String, String) {
    let height = SYNTHETIC_HEIGHT.to_le_bytes();
    let extranonce_len = SYNTHETIC_EXTRANONCE1.len() / 2 + SYNTHETIC_EXTRANONCE2_SIZE;
    let script_len = 4 + extranonce_len + tag.len();
    assert!(script_len < 0xfd);

    let mut coinbase1 = Vec::new();
    coinbase1.extend_from_slice(&1i32.to_le_bytes());
    coinbase1.push(1);
    coinbase1.extend_from_slice(&[0u8; 32]);
    coinbase1.extend_from_slice(&[0xff; 4]);
    coinbase1.push(script_len as u8);
    coinbase1.push(3);
    coinbase1.extend_from_slice(&height[..3]);

    let mut coinbase2 = Vec::new();
    coinbase2.extend_from_slice(tag);
    coinbase2.extend_from_slice(&[0xff; 4]);
    coinbase2.extend_from_slice(&serialize(&outputs));
    coinbase2.extend_from_slice(&[0u8; 4]);

    (hex::encode(coinbase1), hex::encode(coinbase2))
}

/// Deterministic P2PKH wallet for tests: `(address, script_pubkey)`.
pub fn test_wallet(byte: u8) -> (String, ScriptBuf) {
    let hash = PubkeyHash::from_byte_array([byte; 20]);
    let address = Address::p2pkh(hash, Network::Bitcoin).to_string();
    (address, ScriptBuf::new_p2pkh(&hash))
}

pub fn pay(script_pubkey: ScriptBuf, sats: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(sats),
        script_pubkey,
    }
}

/// Witness commitment output as pools emit it.
pub fn witness_commitment() -> TxOut {
    let mut script = vec![0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];
    script.extend_from_slice(&[0x42; 32]);
    pay(ScriptBuf::from_bytes(script), 0)
}

/// Compressed secp256k1 generator, `G`.
pub const MULTISIG_KEY_1: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
/// `2G`.
pub const MULTISIG_KEY_2: &str = "02c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5";
/// P2PKH address of [`MULTISIG_KEY_1`].
pub const MULTISIG_FIRST_KEY_ADDRESS: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

/// Bare `OP_1 <G> <2G> OP_2 OP_CHECKMULTISIG`.
pub fn one_of_two_multisig() -> ScriptBuf {
    let key = |hex_key: &str| PublicKey::from_slice(&hex::decode(hex_key).unwrap()).unwrap();
    Builder::new()
        .push_opcode(OP_PUSHNUM_1)
        .push_key(&key(MULTISIG_KEY_1))
        .push_key(&key(MULTISIG_KEY_2))
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}
