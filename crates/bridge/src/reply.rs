//! Connect reply items.
//!
//! [`ConnectReplyBuilder`] turns the items a dApp asked for into signed
//! replies, in request order. Proof bytes are built by
//! `bridge_crypto::proof`; signing goes through the opaque
//! [`WalletSigner`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bridge_crypto::proof::{ProofHash, proof_digest, proof_message};
use protocol::Network;
use protocol::dapp::extract_domain;
use protocol::messages::{AppManifest, ConnectItem, ConnectItemReply, ConnectRequest, ProofData, ProofDomain};
use signer::WalletSigner;

use crate::BridgeError;

/// Builds reply items for one connect request.
pub struct ConnectReplyBuilder<'a> {
    request: &'a ConnectRequest,
    manifest: &'a AppManifest,
    network: Network,
}

impl<'a> ConnectReplyBuilder<'a> {
    pub fn new(request: &'a ConnectRequest, manifest: &'a AppManifest, network: Network) -> Self {
        Self {
            request,
            manifest,
            network,
        }
    }

    /// Domain proofs are bound to: the manifest's app URL without scheme,
    /// port, or path.
    pub fn domain(&self) -> String {
        extract_domain(&self.manifest.url)
    }

    /// Builds one reply per requested item.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UnsupportedItem`] for an unknown item name
    /// - [`BridgeError::Signer`] when a requested chain key is missing or
    ///   signing fails
    pub fn build(&self, signer: &dyn WalletSigner, timestamp: u64) -> Result<Vec<ConnectItemReply>, BridgeError> {
        let domain = self.domain();
        self.request
            .items
            .iter()
            .map(|item| self.build_item(item, signer, &domain, timestamp))
            .collect()
    }

    fn build_item(
        &self,
        item: &ConnectItem,
        signer: &dyn WalletSigner,
        domain: &str,
        timestamp: u64,
    ) -> Result<ConnectItemReply, BridgeError> {
        let payload = item.payload.as_deref().unwrap_or_default();
        match item.name.as_str() {
            "ton_addr" => Ok(ton_addr_item(signer, self.network)),
            "ton_proof" => Ok(ConnectItemReply::TonProof {
                proof: create_ton_proof(signer, domain, timestamp, payload)?,
            }),
            "solana_proof" => {
                let public_key = signer
                    .solana_public_key()
                    .ok_or(signer::SignerError::MissingKey("solana"))?;
                let digest = proof_digest(
                    &proof_message(&public_key, domain, timestamp, payload),
                    ProofHash::Sha256,
                );
                let signature = signer.sign_solana(&digest)?;
                Ok(ConnectItemReply::SolanaProof {
                    address: bs58::encode(public_key).into_string(),
                    proof: proof_data(domain, timestamp, payload, STANDARD.encode(signature)),
                })
            }
            "ethereum_proof" => {
                let address = signer
                    .ethereum_address()
                    .ok_or(signer::SignerError::MissingKey("ethereum"))?;
                let digest = proof_digest(
                    &proof_message(&address, domain, timestamp, payload),
                    ProofHash::Keccak256,
                );
                let signature = signer.sign_ethereum_prehash(&digest)?;
                Ok(ConnectItemReply::EthereumProof {
                    address: format!("0x{}", hex::encode(address)),
                    proof: proof_data(domain, timestamp, payload, signature),
                })
            }
            other => Err(BridgeError::UnsupportedItem(other.to_string())),
        }
    }
}

/// Signs a `ton_proof` for `domain`.
pub fn create_ton_proof(
    signer: &dyn WalletSigner,
    domain: &str,
    timestamp: u64,
    payload: &str,
) -> Result<ProofData, BridgeError> {
    let address = signer.address().proof_bytes();
    let digest = proof_digest(&proof_message(&address, domain, timestamp, payload), ProofHash::Sha256);
    let signature = signer.sign_ton(&digest)?;
    Ok(proof_data(domain, timestamp, payload, STANDARD.encode(signature)))
}

/// Reply items for a silent reconnect: the address only.
pub fn create_auto_connect_reply_items(signer: &dyn WalletSigner, network: Network) -> Vec<ConnectItemReply> {
    vec![ton_addr_item(signer, network)]
}

fn ton_addr_item(signer: &dyn WalletSigner, network: Network) -> ConnectItemReply {
    ConnectItemReply::TonAddr {
        address: signer.address().to_raw_string(),
        network: network.chain_id().to_string(),
        public_key: hex::encode(signer.public_key()),
        wallet_state_init: signer.wallet_state_init(),
    }
}

fn proof_data(domain: &str, timestamp: u64, payload: &str, signature: String) -> ProofData {
    ProofData {
        timestamp,
        domain: ProofDomain {
            length_bytes: domain.len() as u32,
            value: domain.to_string(),
        },
        signature,
        payload: payload.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
