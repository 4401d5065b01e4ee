mod context;
pub mod settings;

pub use context::{ClientContext, Endpoints};
pub use settings::Settings;
