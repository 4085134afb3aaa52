pub mod dispatch;
pub mod parser;
pub mod url_join;

pub use dispatch::*;
pub use parser::*;
pub use url_join::*;
