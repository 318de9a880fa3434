mod scheduler;

pub use scheduler::LearningRateScheduler;
