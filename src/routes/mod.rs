pub mod admin;
pub mod buyers;
pub mod catalog;
pub mod content;
pub mod distributors;
pub mod notifications;
pub mod payments;
pub mod sellers;
