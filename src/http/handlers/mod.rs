pub mod admin;
pub mod agent;
pub mod auth;
pub mod awx;
pub mod health;
pub mod hosts;
pub mod inventory;
pub mod logs;
