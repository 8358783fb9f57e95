pub mod calc;
pub mod lease;
