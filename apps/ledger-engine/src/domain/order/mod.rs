//! Order lifecycle bounded context.
//!
//! The order aggregate, its status set and the state machine that guards
//! every status change.

mod aggregate;
mod errors;
mod request;
mod state_machine;
mod status;
mod types;

pub use aggregate::Order;
pub use errors::OrderError;
pub use request::OrderRequest;
pub use state_machine::OrderStateMachine;
pub use status::OrderStatus;
pub use types::{Exchange, OrderType, Product, Segment, Side};
