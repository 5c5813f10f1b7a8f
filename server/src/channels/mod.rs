pub mod membership;
pub mod seed;
