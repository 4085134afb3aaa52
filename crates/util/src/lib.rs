pub mod async_runtime;
pub mod http;
pub mod text_processing;

pub use async_runtime::*;
pub use http::*;
pub use text_processing::*;
