mod order_updates_by_id;

pub use order_updates_by_id::OrderUpdatesByIdHandler;
