pub mod account;
pub mod admin;
pub mod cart;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
