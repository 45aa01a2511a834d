use sha2::{Digest, Sha256};

/// Identity of an order event: kind plus protocol order hash
pub fn order_event_hash(event_type: &str, order_hash: &str) -> String {
    digest(&format!("{}:{}", event_type, order_hash))
}

/// Identity of a metadata event: kind, item and send time
pub fn metadata_event_hash(event_type: &str, nft_id: &str, sent_at: &str) -> String {
    digest(&format!("{}:{}:{}", event_type, nft_id, sent_at))
}

fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
