pub mod body;
pub mod redact;
pub mod time_utils;
pub mod url;

// Re-export commonly used functions
pub use body::{normalize, render_body, FieldPolicy, NA};
pub use redact::{mask, omit, MASK};
pub use url::{get_route, get_url, should_audit};
