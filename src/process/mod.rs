pub mod key;
pub mod optimize;
pub mod prepare;

pub use key::KEY_COLUMN;
pub use prepare::{prepare_component, PreparedComponent};
