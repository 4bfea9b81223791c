pub mod cache;
pub mod client;
pub mod extract;
pub mod plan;

pub use cache::*;
pub use client::*;
pub use extract::*;
pub use plan::*;
