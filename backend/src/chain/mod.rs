pub mod client;
pub mod models;
pub mod pocketd;
pub mod traits;

pub use client::PocketClient;
pub use models::{Application, BankAccount, Service, TxOutcome};
pub use pocketd::PocketdExecutor;
pub use traits::{AccountQuery, NetworkRef, TxExecutor};
