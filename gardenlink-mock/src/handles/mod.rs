mod output_handle;
mod pzem_handle;
mod stream_handle;
mod user_handle;

pub use output_handle::*;
pub use pzem_handle::*;
pub use stream_handle::*;
pub use user_handle::*;
