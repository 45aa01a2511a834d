use crate::error::IndexerError;
use crate::types::order_event::OrderEventStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (bid or listing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Sell,
    Buy,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sell => "sell",
            Self::Buy => "buy",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderSide {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sell" => Ok(Self::Sell),
            "buy" => Ok(Self::Buy),
            other => Err(IndexerError::Decode(format!("unknown order side: {}", other))),
        }
    }
}

/// Whether the order can still be filled on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillabilityStatus {
    Fillable,
    Filled,
    Cancelled,
    Expired,
    NoBalance,
}

impl FillabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fillable => "fillable",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::NoBalance => "no-balance",
        }
    }
}

impl FromStr for FillabilityStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fillable" => Ok(Self::Fillable),
            "filled" => Ok(Self::Filled),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "no-balance" => Ok(Self::NoBalance),
            other => Err(IndexerError::Decode(format!(
                "unknown fillability status: {}",
                other
            ))),
        }
    }
}

/// Whether the maker approved the exchange to move the asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    Approved,
    NoApproval,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::NoApproval => "no-approval",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "no-approval" => Ok(Self::NoApproval),
            other => Err(IndexerError::Decode(format!(
                "unknown approval status: {}",
                other
            ))),
        }
    }
}

/// Authoritative order state as stored by the order-saving stage.
/// Read-only to the propagation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Content hash of the order
    pub id: String,
    /// Protocol tag, e.g. `seaport-v1.5`
    pub kind: String,
    pub side: OrderSide,
    pub token_set_id: String,
    pub source: Option<String>,
    /// Validity window start (unix seconds)
    pub valid_from: i64,
    /// Validity window end (unix seconds), open-ended when absent
    pub valid_to: Option<i64>,
    pub quantity_remaining: String,
    pub nonce: Option<String>,
    pub maker: String,
    pub price: Option<String>,
    pub value: Option<String>,
    pub normalized_value: Option<String>,
    pub currency: Option<String>,
    pub fillability_status: FillabilityStatus,
    pub approval_status: ApprovalStatus,
    pub raw_data: serde_json::Value,
    /// When the order was first observed upstream (unix millis)
    pub originated_at: Option<i64>,
    /// When the order row was stored (unix millis)
    pub created_at: i64,
}

impl Order {
    /// Active iff fillable and approved
    pub fn is_active(&self) -> bool {
        self.fillability_status == FillabilityStatus::Fillable
            && self.approval_status == ApprovalStatus::Approved
    }

    /// Ledger status derived from the (fillability, approval) pair
    pub fn event_status(&self) -> OrderEventStatus {
        match (self.fillability_status, self.approval_status) {
            (FillabilityStatus::Filled, _) => OrderEventStatus::Filled,
            (FillabilityStatus::Cancelled, _) => OrderEventStatus::Cancelled,
            (FillabilityStatus::Expired, _) => OrderEventStatus::Expired,
            (FillabilityStatus::NoBalance, _) | (_, ApprovalStatus::NoApproval) => {
                OrderEventStatus::Inactive
            }
            (FillabilityStatus::Fillable, ApprovalStatus::Approved) => OrderEventStatus::Active,
        }
    }
}
