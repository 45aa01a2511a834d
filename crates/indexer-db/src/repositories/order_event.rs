use crate::models::DbOrderEvent;
use crate::Result;
use sqlx::PgPool;

pub struct OrderEventRepository;

impl OrderEventRepository {
    /// Append one ledger row. Returns false when the context already wrote a row for the order.
    pub async fn insert(pool: &PgPool, event: &DbOrderEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_events (context, kind, status, contract, token_id, order_id,
                                      order_kind, order_source, order_valid_from, order_valid_to,
                                      order_quantity_remaining, order_nonce, maker, price, value,
                                      tx_hash, tx_timestamp, log_index, batch_index, block_hash)
            VALUES ($1, $2, $3, $4, $5::NUMERIC, $6, $7, $8, $9, $10, $11::NUMERIC, $12::NUMERIC,
                    $13, $14::NUMERIC, $15::NUMERIC, $16, $17, $18, $19, $20)
            ON CONFLICT (context, order_id) DO NOTHING
            "#,
        )
        .bind(&event.context)
        .bind(&event.kind)
        .bind(&event.status)
        .bind(&event.contract)
        .bind(&event.token_id)
        .bind(&event.order_id)
        .bind(&event.order_kind)
        .bind(&event.order_source)
        .bind(event.order_valid_from)
        .bind(event.order_valid_to)
        .bind(&event.order_quantity_remaining)
        .bind(&event.order_nonce)
        .bind(&event.maker)
        .bind(&event.price)
        .bind(&event.value)
        .bind(&event.tx_hash)
        .bind(event.tx_timestamp)
        .bind(event.log_index)
        .bind(event.batch_index)
        .bind(&event.block_hash)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
