pub mod health;
pub mod validation;
pub mod views;
pub mod ws;
