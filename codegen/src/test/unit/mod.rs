pub mod bind;
pub mod cache;
