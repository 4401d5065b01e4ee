mod auth;
mod log;
mod output;
mod pzem;
mod session;

pub use auth::*;
pub use log::*;
pub use output::*;
pub use pzem::*;
pub use session::*;
