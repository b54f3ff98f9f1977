mod application;
mod env;
mod loader;

pub use application::*;
pub use env::*;
pub use loader::*;
