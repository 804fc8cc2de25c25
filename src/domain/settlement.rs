use super::invoice::Amount;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length in bytes of a simulated settlement reference.
const SIMULATED_REFERENCE_BYTES: usize = 32;

/// A value transfer to attempt through the custodial wallet provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub source_wallet_id: Option<String>,
    pub destination_address: Option<String>,
    pub amount: Amount,
    pub token_id: String,
    pub network: String,
    /// Lets the provider de-duplicate retries of the same transfer.
    pub idempotency_key: String,
}

/// The outcome of a transfer attempt.
///
/// `simulated` is true when no real transfer took place and `reference` was
/// generated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub reference: String,
    pub simulated: bool,
}

impl Settlement {
    pub fn real(reference: String) -> Self {
        Self {
            reference,
            simulated: false,
        }
    }

    /// A placeholder reference shaped like a transaction hash: `0x` followed by
    /// 64 lowercase hex characters.
    pub fn simulated() -> Self {
        let mut bytes = [0u8; SIMULATED_REFERENCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            reference: format!("0x{}", hex),
            simulated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token: TokenInfo,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub destination_address: Option<String>,
}
