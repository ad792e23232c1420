//! Coinbase transaction reconstruction and decoding.
//!
//! A `mining.notify` carries the coinbase transaction split around the
//! extranonce space:
//!
//! ```text
//! coinbase1 | extranonce1 | extranonce2 | coinbase2
//! ```
//!
//! Extranonce1 comes from the subscribe reply. Extranonce2 is chosen by the
//! miner, so when only auditing the payouts any bytes of the right length do.
//! The guessed bytes land in the scriptSig after the BIP34 height push and
//! never touch the outputs.

mod classify;
mod script_sig;

#[cfg(test)]
pub(crate) mod test_data;

pub use classify::{classify_output, ScriptType};
pub use script_sig::{extract_pool_tag, parse_bip34_height};

use bitcoin::{Address, Amount, Network, Transaction};
use rand::Rng;
use thiserror::Error;

use crate::stratum_v1::MAX_EXTRANONCE2_SIZE;
use crate::types::Payout;

#[derive(Error, Debug)]
pub enum CoinbaseError {
    #[error("{part} is not valid hex: {source}")]
    Encoding {
        part: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("coinbase does not decode as a transaction: {0}")]
    Decode(#[from] bitcoin::consensus::encode::Error),

    #[error("extranonce2 size {0} exceeds {max} bytes", max = MAX_EXTRANONCE2_SIZE)]
    Extranonce2Size(usize),
}

/// One classified coinbase output.
#[derive(Debug, Clone)]
pub struct CoinbaseOutput {
    /// Position in the transaction's output list.
    pub index: usize,
    pub value: Amount,
    pub script_type: ScriptType,
    pub address: Option<Address>,
}

/// Result of decoding a coinbase from its Stratum fragments.
#[derive(Debug, Clone)]
pub struct CoinbaseInfo {
    /// The locally guessed extranonce2, hex encoded.
    pub extranonce2: String,
    /// The full transaction as it was decoded, hex encoded.
    pub full_hex: String,
    pub script_sig: Vec<u8>,
    pub outputs: Vec<CoinbaseOutput>,
}

impl CoinbaseInfo {
    /// Block height from the scriptSig, if the pool follows BIP34.
    pub fn block_height(&self) -> Option<u32> {
        parse_bip34_height(&self.script_sig)
    }

    /// Outputs that move value, in transaction order.
    ///
    /// Witness commitments and other OP_RETURN outputs are left out.
    pub fn payouts(&self) -> Vec<Payout> {
        self.outputs
            .iter()
            .filter(|out| !out.script_type.is_data_carrier())
            .map(|out| Payout {
                output_index: out.index,
                address: out
                    .address
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                amount_btc: out.value.to_btc(),
                script_type: out.script_type,
            })
            .collect()
    }
}

/// Join the four coinbase fragments after checking each one is hex.
pub fn build_full_coinbase(
    coinbase1: &str,
    extranonce1: &str,
    extranonce2: &str,
    coinbase2: &str,
) -> Result<String, CoinbaseError> {
    let parts = [
        ("coinbase1", coinbase1),
        ("extranonce1", extranonce1),
        ("extranonce2", extranonce2),
        ("coinbase2", coinbase2),
    ];
    for (part, value) in parts {
        hex::decode(value).map_err(|source| CoinbaseError::Encoding { part, source })?;
    }

    Ok([coinbase1, extranonce1, extranonce2, coinbase2].concat())
}

/// Rebuild the coinbase with a random extranonce2 and classify its outputs.
pub fn decode_coinbase_parts(
    coinbase1: &str,
    coinbase2: &str,
    extranonce1: &str,
    extranonce2_size: usize,
    network: Network,
) -> Result<CoinbaseInfo, CoinbaseError> {
    if extranonce2_size > MAX_EXTRANONCE2_SIZE {
        return Err(CoinbaseError::Extranonce2Size(extranonce2_size));
    }
    let mut extranonce2 = vec![0u8; extranonce2_size];
    rand::thread_rng().fill(&mut extranonce2[..]);
    let extranonce2 = hex::encode(extranonce2);

    let full_hex = build_full_coinbase(coinbase1, extranonce1, &extranonce2, coinbase2)?;
    let bytes = hex::decode(&full_hex).map_err(|source| CoinbaseError::Encoding {
        part: "coinbase",
        source,
    })?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes)?;

    let script_sig = tx
        .input
        .first()
        .map(|input| input.script_sig.to_bytes())
        .unwrap_or_default();

    let outputs = tx
        .output
        .iter()
        .enumerate()
        .map(|(index, out)| {
            let (script_type, address) = classify_output(&out.script_pubkey, network);
            CoinbaseOutput {
                index,
                value: out.value,
                script_type,
                address,
            }
        })
        .collect();

    Ok(CoinbaseInfo {
        extranonce2,
        full_hex,
        script_sig,
        outputs,
    })
}
