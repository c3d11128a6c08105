//! Routes for marketplace sellers (`role = seller`).

pub mod orders;
pub mod products;
