// Web frontend module
pub mod error;
pub mod files;
pub mod gateway;
pub mod protocol;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use error::AppError;
pub use gateway::{CloseStatus, Connection, FrameOutcome};
pub use protocol::{ClientFrame, ServerFrame};
pub use rate_limit::RateLimiter;
pub use routes::{create_router, AppState, Authenticated};
pub use server::WebServer;
