pub mod audit;
pub mod capture_body;
pub mod request_body;

pub use audit::audit_middleware;
pub use capture_body::{CaptureBody, PendingAudit};
pub use request_body::{buffer_request_body, ReplayBody};
