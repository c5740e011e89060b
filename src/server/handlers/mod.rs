pub mod admin;
pub mod ask;
pub mod auth;
pub mod health;
pub mod history;
