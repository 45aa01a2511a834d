use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAttribute {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
}

/// Normalized token metadata handed to the metadata writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub contract: String,
    pub token_id: String,
    pub collection: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub animation_url: Option<String>,
    pub metadata_url: Option<String>,
    pub background_color: Option<String>,
    pub permalink: Option<String>,
    pub attributes: Vec<TokenAttribute>,
    /// Feed send time (unix millis)
    pub updated_at: i64,
}
