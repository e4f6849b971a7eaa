//! Short code allocation
//!
//! Codes are drawn at random from a fixed alphabet and claimed with an
//! atomic insert-if-absent against the link store, retrying on conflict.

pub mod alphabet;
pub mod generator;
pub mod validate;

pub use alphabet::CodeAlphabet;
pub use generator::Generator;
pub use validate::validate_url;
