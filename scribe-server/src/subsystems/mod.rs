pub mod pipeline;
pub mod runner;
pub mod scheduler;
pub mod worker;
