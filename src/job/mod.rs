pub mod task_scheduler;
pub mod update_state;
pub mod volatility_job;
