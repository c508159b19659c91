pub mod discover;
pub mod read;
pub mod utils;

pub use discover::{discover_components, ComponentFile, FileKind};
pub use read::read_component;
