pub mod cache;
pub mod dates;
pub mod graph;
pub mod similarity;
pub mod stats;
#[cfg(feature = "cache")]
pub mod storage;
pub mod text;
