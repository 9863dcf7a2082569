// src/middleware/mod.rs
pub mod allowed_hosts;
pub mod logging;
pub mod session_context;
