pub mod config;
pub mod error;
pub mod paths;
pub mod post;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use post::{CollectedSet, Post};
pub use source::FeedSource;
