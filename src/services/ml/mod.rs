//! Machine Learning services

pub mod official;
pub mod smollm3;
pub mod streaming;

pub mod service;

pub use service::MLService;
pub use smollm3::KVCache;  // Re-export from smollm3
