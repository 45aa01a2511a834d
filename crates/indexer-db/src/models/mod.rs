mod order;
mod order_event;

pub use order::DbOrder;
pub use order_event::DbOrderEvent;
