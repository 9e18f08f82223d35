// Source tables and player population normalization.

pub mod normalize;
pub mod tables;
