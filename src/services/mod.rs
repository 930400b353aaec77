mod generation;
mod metrics;
mod session;
pub mod template;

pub use generation::GenerationService;
pub use metrics::{MetricsService, MetricsStats};
pub use session::{Session, SessionManager};
