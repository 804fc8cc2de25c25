use crate::domain::ports::WalletApiRef;
use crate::domain::settlement::{Settlement, TokenBalance, TransferRequest, WalletTransaction};
use crate::error::{EngineError, Result};
use tracing::{info, instrument, warn};

/// Executes value transfers through the custodial wallet provider.
///
/// `transfer` never fails: when the wallets are not configured, or the provider
/// rejects the transfer, it degrades to a locally generated reference and flags
/// the settlement as `simulated`. Callers decide whether to accept that.
pub struct PaymentGateway {
    wallet: Option<WalletApiRef>,
}

impl PaymentGateway {
    pub fn new(wallet: Option<WalletApiRef>) -> Self {
        Self { wallet }
    }

    #[instrument(skip(self, request), fields(amount = %request.amount, network = %request.network))]
    pub async fn transfer(&self, request: &TransferRequest) -> Settlement {
        let source = request.source_wallet_id.as_deref().filter(|s| !s.is_empty());
        let destination = request.destination_address.as_deref().filter(|s| !s.is_empty());

        let (Some(wallet), Some(source), Some(destination)) = (&self.wallet, source, destination) else {
            warn!("wallets not configured, simulating transfer");
            return Settlement::simulated();
        };

        info!(from = source, to = destination, "submitting transfer");
        match wallet.create_transfer(request).await {
            Ok(id) if !id.is_empty() => {
                info!(transaction_id = %id, "transfer created");
                Settlement::real(id)
            }
            Ok(_) => {
                warn!("provider returned no transaction id, simulating transfer");
                Settlement::simulated()
            }
            Err(e) => {
                warn!(error = %e, "transfer failed, simulating transfer");
                Settlement::simulated()
            }
        }
    }

    pub async fn balance(&self, wallet_id: &str) -> Result<Vec<TokenBalance>> {
        self.wallet()?.balance(wallet_id).await
    }

    pub async fn transactions(&self, wallet_id: &str, network: &str) -> Result<Vec<WalletTransaction>> {
        self.wallet()?.transactions(wallet_id, network).await
    }

    fn wallet(&self) -> Result<&WalletApiRef> {
        self.wallet
            .as_ref()
            .ok_or_else(|| EngineError::Configuration("wallet API is not configured".to_string()))
    }
}
