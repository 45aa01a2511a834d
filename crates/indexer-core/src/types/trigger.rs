use crate::types::order::OrderSide;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel id some watchers emit for "no order"; never enqueued
pub const ZERO_ORDER_ID: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// What happened to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    NewOrder,
    Reprice,
    Cancel,
    Revalidate,
    Expiry,
    Sale,
    BalanceChange,
    ApprovalChange,
    Bootstrap,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new-order",
            Self::Reprice => "reprice",
            Self::Cancel => "cancel",
            Self::Revalidate => "revalidate",
            Self::Expiry => "expiry",
            Self::Sale => "sale",
            Self::BalanceChange => "balance-change",
            Self::ApprovalChange => "approval-change",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized description of a change, with chain metadata when chain-originated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl Trigger {
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            tx_hash: None,
            tx_timestamp: None,
            log_index: None,
            batch_index: None,
            block_hash: None,
        }
    }

    /// Attach the on-chain position of the log that caused the trigger
    pub fn with_chain_position(
        mut self,
        tx_hash: impl Into<String>,
        tx_timestamp: i64,
        log_index: u64,
        batch_index: u64,
        block_hash: impl Into<String>,
    ) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self.tx_timestamp = Some(tx_timestamp);
        self.log_index = Some(log_index);
        self.batch_index = Some(batch_index);
        self.block_hash = Some(block_hash.into());
        self
    }

    /// Deterministic idempotency key for a change to `subject`.
    ///
    /// Chain-originated triggers are pinned to their log position; anything
    /// else must supply its own observation time.
    pub fn context_for(&self, subject: &str, observed_at: i64) -> String {
        match (&self.tx_hash, self.log_index, self.batch_index) {
            (Some(tx_hash), Some(log_index), Some(batch_index)) => format!(
                "{}-{}-{}-{}-{}",
                self.kind, subject, tx_hash, log_index, batch_index
            ),
            (Some(tx_hash), _, _) => format!("{}-{}-{}", self.kind, subject, tx_hash),
            _ => format!("{}-{}-{}", self.kind, subject, observed_at),
        }
    }
}

/// One entry of a trigger bulk submission (the job payload of the order-updates queue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdateInfo {
    /// Idempotency key; equal contexts collapse into one executed mutation
    pub context: String,
    pub trigger: Trigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<OrderSide>,
}

impl OrderUpdateInfo {
    pub fn by_id(context: impl Into<String>, trigger: Trigger, id: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            trigger,
            id: Some(id.into()),
            token_set_id: None,
            side: None,
        }
    }

    pub fn by_token_set(
        context: impl Into<String>,
        trigger: Trigger,
        token_set_id: impl Into<String>,
        side: OrderSide,
    ) -> Self {
        Self {
            context: context.into(),
            trigger,
            id: None,
            token_set_id: Some(token_set_id.into()),
            side: Some(side),
        }
    }

    /// True when the entry points at the all-zero sentinel id
    pub fn has_zero_id(&self) -> bool {
        self.id
            .as_deref()
            .map(|id| id.eq_ignore_ascii_case(ZERO_ORDER_ID))
            .unwrap_or(false)
    }
}
