//! Core data types shared by the feed, strategy and trading crates.

pub mod enums;
pub mod market_data;
pub mod trading;

pub use enums::*;
pub use market_data::*;
pub use trading::*;
