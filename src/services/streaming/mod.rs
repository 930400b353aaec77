//! Unified streaming services

mod buffer;
mod sse_handler;

pub use buffer::StreamingBuffer;
pub use sse_handler::SseHandler;
