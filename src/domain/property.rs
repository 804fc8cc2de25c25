use super::invoice::Amount;
use serde::{Deserialize, Serialize};

/// A tokenized rental property. Read-only from the engine's point of view.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub monthly_rent: Amount,
    /// On-chain token identifier of the property.
    pub token_id: String,
    /// Where the owner receives rent. Empty when not yet provisioned.
    #[serde(default)]
    pub owner_address: String,
}
