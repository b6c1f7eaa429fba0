pub mod identity;
pub mod job_status;
pub mod notifier;
pub mod orchestrator;
pub mod price_analyzer;
pub mod product_client;
pub mod report;
pub mod scheduler;
