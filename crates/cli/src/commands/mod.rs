pub mod enqueue;
pub mod guardian;
pub mod status;
pub mod worker;
