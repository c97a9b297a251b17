pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod payload;
pub mod presence;
pub mod reporter;
pub mod resolver;
pub mod user_agent;

pub use config::Config;
pub use reporter::{Report, Reporter};
pub use resolver::{Context, Headers, RequestLike};
pub use payload::ResultLike;
