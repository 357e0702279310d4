//! Terminal output

pub mod output;
pub mod table;
