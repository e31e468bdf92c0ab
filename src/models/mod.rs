pub mod user;
pub mod direction;
pub mod service;
pub mod audit_log;
pub mod user_change;
pub mod notification;
