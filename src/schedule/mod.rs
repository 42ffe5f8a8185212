pub mod pool;
pub mod scheduler;
