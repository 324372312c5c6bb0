pub mod retry;
pub mod scheduler;

pub use retry::RetryPolicy;
pub use scheduler::TaskScheduler;
