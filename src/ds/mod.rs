pub mod order_list;

pub use order_list::{OrderList, OrderSlot};
