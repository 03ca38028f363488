//! Backend signing wallet and legacy (EIP-155) transaction encoding

use crate::error::{FaucetError, FaucetResult};
use k256::ecdsa::SigningKey;
use kol_common::Address;
use rlp::RlpStream;

/// Unsigned legacy transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

impl LegacyTransaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.as_bytes().to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// EIP-155 signing payload: the six fields followed by `chain_id, 0, 0`
    pub fn signing_payload(&self, chain_id: u64) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        stream.out().to_vec()
    }
}

/// Holds the backend private key
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Parse a 32-byte hex private key, `0x` prefix optional
    pub fn from_hex(private_key: &str) -> FaucetResult<Self> {
        let trimmed = private_key.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(key_hex)
            .map_err(|e| FaucetError::Configuration(format!("Invalid private key: {}", e)))?;

        if bytes.len() != 32 {
            return Err(FaucetError::Configuration(format!(
                "Invalid private key: expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| FaucetError::Configuration(format!("Invalid signing key: {}", e)))?;

        // Address is the last 20 bytes of keccak(uncompressed pubkey without the 0x04 tag)
        let public_key = signing_key.verifying_key().to_encoded_point(false);
        let hash = keccak_hash::keccak(&public_key.as_bytes()[1..]);
        let mut addr_bytes = [0u8; 20];
        addr_bytes.copy_from_slice(&hash.0[12..]);

        Ok(Self {
            signing_key,
            address: Address(addr_bytes),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign `tx` for `chain_id` and return the raw RLP-encoded transaction
    pub fn sign_transaction(&self, tx: &LegacyTransaction, chain_id: u64) -> FaucetResult<Vec<u8>> {
        let digest = keccak_hash::keccak(tx.signing_payload(chain_id));

        // k256 yields low-s signatures with a matching recovery id
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest.0)
            .map_err(|e| FaucetError::Signing(e.to_string()))?;

        let v = chain_id
            .checked_mul(2)
            .and_then(|n| n.checked_add(35 + recovery_id.to_byte() as u64))
            .ok_or_else(|| FaucetError::Signing(format!("chain id {} too large", chain_id)))?;

        let sig_bytes = signature.to_bytes();
        let (r, s) = sig_bytes.split_at(32);

        let mut stream = RlpStream::new_list(9);
        tx.append_fields(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(r).to_vec());
        stream.append(&trim_leading_zeros(s).to_vec());
        Ok(stream.out().to_vec())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish_non_exhaustive()
    }
}

/// RLP integers carry no leading zero bytes
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn sample_tx() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: "0x3535353535353535353535353535353535353535".parse().unwrap(),
            value: 1_000_000_000_000_000_000,
            data: vec![],
        }
    }

    #[test]
    fn test_address_derivation() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            wallet.address().to_checksum(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn test_bad_keys_are_configuration_errors() {
        let zero_key = "00".repeat(32);
        for key in ["", "0x1234", "not hex", zero_key.as_str()] {
            assert!(
                matches!(Wallet::from_hex(key), Err(FaucetError::Configuration(_))),
                "{:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        // Example from EIP-155
        let payload = sample_tx().signing_payload(1);
        assert_eq!(
            hex::encode(payload),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let wallet = Wallet::from_hex(KEY_ONE).unwrap();
        let tx = sample_tx();
        let chain_id = 8453;
        let raw = wallet.sign_transaction(&tx, chain_id).unwrap();

        let rlp = rlp::Rlp::new(&raw);
        assert_eq!(rlp.item_count().unwrap(), 9);
        assert_eq!(rlp.val_at::<u64>(0).unwrap(), 9);

        let v: u64 = rlp.val_at(6).unwrap();
        assert!(v == chain_id * 2 + 35 || v == chain_id * 2 + 36);

        let r: Vec<u8> = rlp.val_at(7).unwrap();
        let s: Vec<u8> = rlp.val_at(8).unwrap();
        let mut sig = [0u8; 64];
        sig[32 - r.len()..32].copy_from_slice(&r);
        sig[64 - s.len()..].copy_from_slice(&s);
        let signature = Signature::from_slice(&sig).unwrap();
        let recovery_id = RecoveryId::from_byte((v - chain_id * 2 - 35) as u8).unwrap();

        let digest = keccak_hash::keccak(tx.signing_payload(chain_id));
        let recovered =
            VerifyingKey::recover_from_prehash(&digest.0, &signature, recovery_id).unwrap();
        assert_eq!(&recovered, wallet.signing_key.verifying_key());
    }

    #[test]
    fn test_trim_leading_zeros() {
        assert_eq!(trim_leading_zeros(&[0, 0, 1, 0]), &[1, 0]);
        assert_eq!(trim_leading_zeros(&[0, 0]), &[] as &[u8]);
    }
}
