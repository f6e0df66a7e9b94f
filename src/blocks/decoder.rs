//! Bitcoin consensus decoder
//!
//! Turns a raw record payload into the crate's block model. Output scripts are
//! reduced to addresses with `Address::from_script`; pay-to-pubkey outputs
//! (most early coinbases) are attributed to the key's P2PKH address so those
//! coins stay traceable. Anything else yields an output with no addresses.

use super::{Block, BlockDecoder, Transaction, TxInput, TxOutput};
use crate::{Error, Result};
use bitcoin::{Address, Network, PublicKey, Script};

/// Decoder for Bitcoin's consensus block encoding
#[derive(Debug, Clone, Copy)]
pub struct BitcoinDecoder {
    network: Network,
}

impl Default for BitcoinDecoder {
    fn default() -> Self {
        Self::new(Network::Bitcoin)
    }
}

impl BitcoinDecoder {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Record delimiter of this decoder's network
    pub fn magic(&self) -> [u8; 4] {
        self.network.magic().to_bytes()
    }

    fn script_addresses(&self, script: &Script) -> Vec<String> {
        if let Ok(address) = Address::from_script(script, self.network) {
            return vec![address.to_string()];
        }
        if script.is_p2pk() {
            let bytes = script.as_bytes();
            if let Ok(pk) = PublicKey::from_slice(&bytes[1..bytes.len() - 1]) {
                return vec![Address::p2pkh(pk.pubkey_hash(), self.network).to_string()];
            }
        }
        Vec::new()
    }
}

impl BlockDecoder for BitcoinDecoder {
    fn decode(&self, raw: &[u8]) -> Result<Block> {
        let block: bitcoin::Block = bitcoin::consensus::deserialize(raw)
            .map_err(|e| Error::decode(format!("invalid block ({} bytes): {}", raw.len(), e)))?;

        let transactions = block
            .txdata
            .iter()
            .map(|tx| Transaction {
                id: tx.compute_txid().to_string(),
                inputs: tx
                    .input
                    .iter()
                    .map(|txin| {
                        TxInput::new(
                            txin.previous_output.txid.to_string(),
                            txin.previous_output.vout,
                        )
                    })
                    .collect(),
                outputs: tx
                    .output
                    .iter()
                    .map(|txout| TxOutput {
                        addresses: self.script_addresses(txout.script_pubkey.as_script()),
                    })
                    .collect(),
            })
            .collect();

        Ok(Block {
            hash: block.block_hash().to_string(),
            timestamp: block.header.time,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::constants::genesis_block;

    #[test]
    fn test_decode_genesis_block() {
        let raw = bitcoin::consensus::serialize(&genesis_block(Network::Bitcoin));
        let block = BitcoinDecoder::default().decode(&raw).unwrap();

        assert_eq!(
            block.hash,
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(block.timestamp, 1231006505);
        assert_eq!(block.transactions.len(), 1);

        let coinbase = &block.transactions[0];
        assert_eq!(
            coinbase.id,
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
        assert!(coinbase.is_coinbase());
        assert_eq!(
            coinbase.output_addresses(),
            vec!["1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string()]
        );
    }

    #[test]
    fn test_decode_garbage() {
        let err = BitcoinDecoder::default().decode(&[0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_magic() {
        assert_eq!(
            BitcoinDecoder::default().magic(),
            crate::blocks::scanner::MAINNET_MAGIC
        );
        assert_ne!(
            BitcoinDecoder::new(Network::Regtest).magic(),
            crate::blocks::scanner::MAINNET_MAGIC
        );
    }
}
