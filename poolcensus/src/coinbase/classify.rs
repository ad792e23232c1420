//! Output script classification.

use std::fmt;

use bitcoin::script::Instruction;
use bitcoin::{Address, Network, PublicKey, Script};
use serde::{Deserialize, Serialize};

/// OP_RETURN, push 36, then the BIP141 commitment header.
const WITNESS_COMMITMENT_PREFIX: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];
const WITNESS_COMMITMENT_LEN: usize = 38;

/// Category of an output's locking script.
///
/// The serialized names are the conventional script class names, so reports
/// stay readable next to block explorer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptType {
    #[serde(rename = "witness_commitment")]
    WitnessCommitment,
    #[serde(rename = "OP_RETURN")]
    OpReturn,
    #[serde(rename = "pubkey")]
    PubKey,
    #[serde(rename = "pubkeyhash")]
    PubKeyHash,
    #[serde(rename = "multisig")]
    Multisig,
    #[serde(rename = "scripthash")]
    ScriptHash,
    #[serde(rename = "witness_v0_keyhash")]
    WitnessV0KeyHash,
    #[serde(rename = "witness_v0_scripthash")]
    WitnessV0ScriptHash,
    #[serde(rename = "witness_v1_taproot")]
    WitnessV1Taproot,
    #[serde(rename = "witness_unknown")]
    WitnessUnknown,
    #[serde(rename = "nonstandard")]
    NonStandard,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::WitnessCommitment => "witness_commitment",
            ScriptType::OpReturn => "OP_RETURN",
            ScriptType::PubKey => "pubkey",
            ScriptType::PubKeyHash => "pubkeyhash",
            ScriptType::Multisig => "multisig",
            ScriptType::ScriptHash => "scripthash",
            ScriptType::WitnessV0KeyHash => "witness_v0_keyhash",
            ScriptType::WitnessV0ScriptHash => "witness_v0_scripthash",
            ScriptType::WitnessV1Taproot => "witness_v1_taproot",
            ScriptType::WitnessUnknown => "witness_unknown",
            ScriptType::NonStandard => "nonstandard",
        }
    }

    /// Outputs that never move value to anyone.
    pub fn is_data_carrier(&self) -> bool {
        matches!(self, ScriptType::WitnessCommitment | ScriptType::OpReturn)
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an output script and derive its address on `network`.
///
/// The address is `None` for data carriers and for scripts that have no
/// standard address form. Pay-to-pubkey outputs are reported under the
/// P2PKH address of their key, and bare multisig outputs under that of
/// their first key.
pub fn classify_output(script: &Script, network: Network) -> (ScriptType, Option<Address>) {
    let bytes = script.as_bytes();
    if bytes.len() >= WITNESS_COMMITMENT_LEN && bytes[..6] == WITNESS_COMMITMENT_PREFIX {
        return (ScriptType::WitnessCommitment, None);
    }
    if script.is_op_return() {
        return (ScriptType::OpReturn, None);
    }

    let script_type = if script.is_p2pkh() {
        ScriptType::PubKeyHash
    } else if script.is_p2sh() {
        ScriptType::ScriptHash
    } else if script.is_p2wpkh() {
        ScriptType::WitnessV0KeyHash
    } else if script.is_p2wsh() {
        ScriptType::WitnessV0ScriptHash
    } else if script.is_p2tr() {
        ScriptType::WitnessV1Taproot
    } else if script.is_witness_program() {
        ScriptType::WitnessUnknown
    } else if script.is_p2pk() {
        ScriptType::PubKey
    } else if script.is_multisig() {
        ScriptType::Multisig
    } else {
        ScriptType::NonStandard
    };

    let address = match script_type {
        ScriptType::PubKey => script
            .p2pk_public_key()
            .map(|pk| Address::p2pkh(pk.pubkey_hash(), network)),
        ScriptType::Multisig => first_multisig_key(script)
            .map(|pk| Address::p2pkh(pk.pubkey_hash(), network)),
        ScriptType::NonStandard => None,
        _ => Address::from_script(script, network).ok(),
    };

    (script_type, address)
}

/// First key pushed after the `m` opcode of a bare multisig script.
fn first_multisig_key(script: &Script) -> Option<PublicKey> {
    script
        .instructions()
        .skip(1)
        .find_map(|ins| match ins {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes),
            _ => None,
        })
        .and_then(|bytes| PublicKey::from_slice(bytes.as_bytes()).ok())
}
