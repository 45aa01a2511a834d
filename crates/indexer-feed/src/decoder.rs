//! Protocol order decoding.
//!
//! Each chain has a fixed table of exchange addresses; the address a feed
//! event names selects the order format. Unknown addresses are rejected.

use alloy_primitives::{Address, U256};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

const SEAPORT_V1_4: &str = "0x00000000000001ad428e4906ae43d8f9852d0dd6";
const SEAPORT_V1_5: &str = "0x00000000000000adc04c56bf30ac9d3c0aaf14dc";
const SEAPORT_V1_6: &str = "0x0000000000000068f116a894984e2db1123eb395";

/// Chains where the exchanges are deployed at their canonical addresses
const SEAPORT_CHAINS: &[u64] = &[1, 10, 137, 8453, 42161, 7777777, 11155111, 84532];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderFormat {
    SeaportV14,
    SeaportV15,
    SeaportV16,
}

impl OrderFormat {
    /// Order kind tag stored with the order
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SeaportV14 => "seaport-v1.4",
            Self::SeaportV15 => "seaport-v1.5",
            Self::SeaportV16 => "seaport-v1.6",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("unknown protocol address {0}")]
    UnknownProtocol(String),

    #[error("malformed order data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferItem {
    pub item_type: u8,
    pub token: Address,
    #[serde(deserialize_with = "u256_from_wire")]
    pub identifier_or_criteria: U256,
    #[serde(deserialize_with = "u256_from_wire")]
    pub start_amount: U256,
    #[serde(deserialize_with = "u256_from_wire")]
    pub end_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsiderationItem {
    pub item_type: u8,
    pub token: Address,
    #[serde(deserialize_with = "u256_from_wire")]
    pub identifier_or_criteria: U256,
    #[serde(deserialize_with = "u256_from_wire")]
    pub start_amount: U256,
    #[serde(deserialize_with = "u256_from_wire")]
    pub end_amount: U256,
    pub recipient: Address,
}

/// Seaport order components as carried in `protocol_data.parameters`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeaportParameters {
    pub offerer: Address,
    pub zone: Address,
    pub offer: Vec<OfferItem>,
    pub consideration: Vec<ConsiderationItem>,
    pub order_type: u8,
    #[serde(deserialize_with = "u256_from_wire")]
    pub start_time: U256,
    #[serde(deserialize_with = "u256_from_wire")]
    pub end_time: U256,
    pub zone_hash: String,
    pub salt: String,
    pub conduit_key: String,
    #[serde(deserialize_with = "u256_from_wire")]
    pub counter: U256,
    #[serde(default)]
    pub total_original_consideration_items: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProtocolData {
    parameters: SeaportParameters,
    #[serde(default)]
    signature: Option<String>,
}

/// A fully decoded order, ready for the order-saving stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedOrder {
    pub format: OrderFormat,
    pub parameters: SeaportParameters,
    pub signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn u256_from_wire<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(U256::from(n)),
        NumberOrString::String(s) => U256::from_str(s.trim()).map_err(D::Error::custom),
    }
}

/// Per-chain address to order-format table
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    chain_id: u64,
    formats: HashMap<Address, OrderFormat>,
}

impl ProtocolTable {
    pub fn for_chain(chain_id: u64) -> Self {
        let mut formats = HashMap::new();
        if SEAPORT_CHAINS.contains(&chain_id) {
            for (address, format) in [
                (SEAPORT_V1_4, OrderFormat::SeaportV14),
                (SEAPORT_V1_5, OrderFormat::SeaportV15),
                (SEAPORT_V1_6, OrderFormat::SeaportV16),
            ] {
                if let Ok(address) = Address::from_str(address) {
                    formats.insert(address, format);
                }
            }
        }
        Self { chain_id, formats }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Order format of the exchange at `protocol_address`, case-insensitive
    pub fn resolve(&self, protocol_address: &str) -> Result<OrderFormat, DecodeFailure> {
        let address = Address::from_str(protocol_address.trim())
            .map_err(|_| DecodeFailure::UnknownProtocol(protocol_address.to_string()))?;
        self.formats
            .get(&address)
            .copied()
            .ok_or_else(|| DecodeFailure::UnknownProtocol(protocol_address.to_string()))
    }

    pub fn decode(
        &self,
        protocol_address: &str,
        protocol_data: &serde_json::Value,
    ) -> Result<DecodedOrder, DecodeFailure> {
        let format = self.resolve(protocol_address)?;

        let data = ProtocolData::deserialize(protocol_data)
            .map_err(|e| DecodeFailure::Malformed(e.to_string()))?;
        let parameters = data.parameters;

        if parameters.offer.is_empty() {
            return Err(DecodeFailure::Malformed("order has no offer items".to_string()));
        }
        if parameters.consideration.is_empty() {
            return Err(DecodeFailure::Malformed(
                "order has no consideration items".to_string(),
            ));
        }
        if parameters.end_time <= parameters.start_time {
            return Err(DecodeFailure::Malformed("order validity window is empty".to_string()));
        }

        Ok(DecodedOrder {
            format,
            parameters,
            signature: data.signature,
        })
    }
}
