mod order;
mod order_event;

pub use order::OrderRepository;
pub use order_event::OrderEventRepository;
