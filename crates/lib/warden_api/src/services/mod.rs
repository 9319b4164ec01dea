//! Request-side services shared by handlers and middleware.

pub mod bootstrap;
pub mod client_ip;
