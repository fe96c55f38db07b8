//! HTTP surface for the SMS pipeline: request/response DTOs, input
//! validation, the message service, and the axum router.

pub mod dto;
pub mod error;
pub mod routes;
pub mod service;
pub mod validation;

pub use dto::{MessageView, SendMessageRequest};
pub use error::ApiError;
pub use routes::{create_router, ApiState};
pub use service::MessageService;
