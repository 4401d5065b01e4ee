mod account;
mod output;
mod pzem;

pub use account::AccountService;
pub use output::OutputService;
pub use pzem::PzemService;
