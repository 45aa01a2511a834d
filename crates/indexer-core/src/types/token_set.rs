use crate::types::order::OrderSide;

/// View over a token-set id such as `token:{contract}:{tokenId}`,
/// `contract:{contract}`, `range:{contract}:{start}:{end}` or `list:{contract}:{merkleRoot}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSetId<'a>(&'a str);

impl<'a> TokenSetId<'a> {
    pub fn new(id: &'a str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    pub fn is_single_token(&self) -> bool {
        self.0.starts_with("token:")
    }

    /// Second segment of the id, the contract for every known prefix
    pub fn contract(&self) -> Option<&'a str> {
        self.0.split(':').nth(1).filter(|contract| !contract.is_empty())
    }

    /// (contract, tokenId) of a single-token set
    pub fn single_token(&self) -> Option<(&'a str, &'a str)> {
        let rest = self.0.strip_prefix("token:")?;
        let (contract, token_id) = rest.split_once(':')?;
        if contract.is_empty() || token_id.is_empty() || token_id.contains(':') {
            return None;
        }
        Some((contract, token_id))
    }
}

/// Order classification used for latency reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Listing,
    TokenOffer,
    AttributeOffer,
    CollectionOffer,
}

impl OrderType {
    pub fn classify(side: OrderSide, token_set_id: &str) -> Option<Self> {
        match side {
            OrderSide::Sell => Some(Self::Listing),
            OrderSide::Buy => {
                if token_set_id.starts_with("token:") {
                    Some(Self::TokenOffer)
                } else if token_set_id.starts_with("list:") {
                    Some(Self::AttributeOffer)
                } else if token_set_id.starts_with("contract:")
                    || token_set_id.starts_with("range:")
                    || token_set_id.starts_with("collection-non-flagged:")
                {
                    Some(Self::CollectionOffer)
                } else {
                    None
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::TokenOffer => "token_offer",
            Self::AttributeOffer => "attribute_offer",
            Self::CollectionOffer => "collection_offer",
        }
    }
}
