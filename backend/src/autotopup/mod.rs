pub mod events;
pub mod models;
pub mod poll;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use models::{TopUpEvent, TopUpPolicy};
pub use scheduler::TopUpScheduler;
pub use store::PolicyStore;
pub use worker::TopUpWorker;
