pub mod health;
pub mod diagnostics;
pub mod error;
pub mod file;
pub mod messages;
pub mod version;

pub use health::*;
pub use diagnostics::*;
pub use error::*;
pub use file::*;
pub use messages::*;
pub use version::*;
