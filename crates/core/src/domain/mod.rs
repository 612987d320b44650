pub mod market;
pub mod opportunity;
