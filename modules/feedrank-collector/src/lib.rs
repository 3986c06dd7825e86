pub mod channels;
pub mod controller;
pub mod export;
pub mod fuse;
pub mod session;
pub mod simfeed;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
