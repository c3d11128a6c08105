//! Routes for shoppers (`role = buyer`).

pub mod carts;
pub mod orders;
pub mod returns;
pub mod rewards;
