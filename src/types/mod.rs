pub mod errors;
pub mod events;
pub mod prediction;
pub mod prompt;

pub use errors::AppError;
pub use events::StreamEvent;
pub use prediction::Prediction;
pub use prompt::Prompt;
