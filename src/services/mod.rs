// src/services/mod.rs
pub mod oauth;
pub mod uploader;

pub use uploader::{TempUpload, UploadRequest};
