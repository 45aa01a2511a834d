use crate::models::DbOrder;
use crate::Result;
use sqlx::PgPool;

const ORDER_COLUMNS: &str = r#"
    id, kind, side, token_set_id, source, valid_from, valid_to,
    quantity_remaining::TEXT AS quantity_remaining,
    nonce::TEXT AS nonce,
    maker,
    price::TEXT AS price,
    value::TEXT AS value,
    normalized_value::TEXT AS normalized_value,
    currency, fillability_status, approval_status, raw_data,
    (EXTRACT(EPOCH FROM originated_at) * 1000)::BIGINT AS originated_at,
    (EXTRACT(EPOCH FROM created_at) * 1000)::BIGINT AS created_at
"#;

pub struct OrderRepository;

impl OrderRepository {
    /// Get order by ID
    pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<DbOrder>> {
        let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let result = sqlx::query_as::<_, DbOrder>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(result)
    }

}
