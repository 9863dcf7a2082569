// src/handlers/mod.rs
pub mod auth;
pub mod pages;
pub mod upload;
