pub mod config;
pub mod device;
pub mod gguf_loader;
pub mod loader;
pub mod model;
pub mod quantized_model;
pub mod llama_forward;

pub use config::SmolLM3Config;
pub use device::get_device;
pub use gguf_loader::{load_smollm3_gguf, inspect_gguf};
pub use loader::OfficialLoader;
pub use model::{SmolLM3Model, OfficialSmolLM3Model};
