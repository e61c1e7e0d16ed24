//! Command implementations for the `rollcall` binary.

pub mod check;
pub mod locate;
pub mod records;
pub mod simulate;
