use crate::domain::ports::WalletApi;
use crate::domain::settlement::{TokenBalance, TransferRequest, WalletTransaction};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

const FEE_LEVEL: &str = "MEDIUM";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody<'a> {
    idempotency_key: &'a str,
    entity_secret_ciphertext: String,
    wallet_id: &'a str,
    destination_address: &'a str,
    amounts: Vec<String>,
    token_id: &'a str,
    fee_level: &'static str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CreatedTransaction {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Balances {
    #[serde(default)]
    token_balances: Vec<TokenBalance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityPublicKey {
    public_key: String,
}

#[derive(Deserialize)]
struct Transactions {
    #[serde(default)]
    transactions: Vec<WalletTransaction>,
}

/// The 32-byte entity secret that authorizes developer-controlled transfers.
///
/// The provider rejects a ciphertext it has seen before, so every request
/// carries a fresh RSA-OAEP (SHA-256) encryption under the entity public key.
pub struct EntitySecret {
    bytes: Vec<u8>,
}

impl EntitySecret {
    /// Parses the secret from its hex form.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.is_empty() || hex.len() % 2 != 0 {
            return Err(EngineError::Configuration(
                "entity secret must be an even-length hex string".to_string(),
            ));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| EngineError::Configuration("entity secret is not valid hex".to_string()))?;
        Ok(Self { bytes })
    }

    /// A new base64 ciphertext; two calls never return the same value.
    pub fn encrypt(&self, public_key: &RsaPublicKey) -> Result<String> {
        let ciphertext = public_key
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), &self.bytes)
            .map_err(|e| EngineError::Configuration(format!("failed to encrypt entity secret: {}", e)))?;
        Ok(STANDARD.encode(ciphertext))
    }
}

/// Reads the entity public key from PEM. The provider labels an SPKI body as
/// `RSA PUBLIC KEY`, so the label is ignored and both encodings are tried.
fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();
    let der = STANDARD
        .decode(body)
        .map_err(|e| EngineError::ExternalService(format!("entity public key is not base64: {}", e)))?;
    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|e| EngineError::ExternalService(format!("invalid entity public key: {}", e)))
}

/// REST client for Circle developer-controlled wallets.
pub struct CircleWalletClient {
    client: Client,
    base_url: String,
    api_key: String,
    entity_secret: Option<EntitySecret>,
    public_key: OnceCell<RsaPublicKey>,
}

impl CircleWalletClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        entity_secret: Option<EntitySecret>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            entity_secret,
            public_key: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/w3s{}", self.base_url, path)
    }

    /// Fetched on first use, then cached for the life of the client.
    async fn public_key(&self) -> Result<&RsaPublicKey> {
        self.public_key
            .get_or_try_init(|| async {
                debug!("fetching entity public key");
                let key: Envelope<EntityPublicKey> = self
                    .client
                    .get(self.url("/config/entity/publicKey"))
                    .bearer_auth(&self.api_key)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                parse_public_key(&key.data.public_key)
            })
            .await
    }

    async fn entity_secret_ciphertext(&self) -> Result<String> {
        let secret = self
            .entity_secret
            .as_ref()
            .ok_or_else(|| EngineError::Configuration("entity secret is not configured".to_string()))?;
        secret.encrypt(self.public_key().await?)
    }
}

#[async_trait]
impl WalletApi for CircleWalletClient {
    async fn create_transfer(&self, request: &TransferRequest) -> Result<String> {
        let wallet_id = required(&request.source_wallet_id, "source wallet")?;
        let destination_address = required(&request.destination_address, "destination address")?;
        let body = TransferBody {
            idempotency_key: &request.idempotency_key,
            entity_secret_ciphertext: self.entity_secret_ciphertext().await?,
            wallet_id,
            destination_address,
            amounts: vec![request.amount.to_string()],
            token_id: &request.token_id,
            fee_level: FEE_LEVEL,
        };

        let created: Envelope<CreatedTransaction> = self
            .client
            .post(self.url("/developer/transactions/transfer"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(created.data.id)
    }

    async fn balance(&self, wallet_id: &str) -> Result<Vec<TokenBalance>> {
        let balances: Envelope<Balances> = self
            .client
            .get(self.url(&format!("/wallets/{}/balances", wallet_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(balances.data.token_balances)
    }

    async fn transactions(&self, wallet_id: &str, network: &str) -> Result<Vec<WalletTransaction>> {
        let listed: Envelope<Transactions> = self
            .client
            .get(self.url("/transactions"))
            .query(&[("walletIds", wallet_id), ("blockchain", network)])
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(listed.data.transactions)
    }
}
