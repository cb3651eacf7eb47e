pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod outcome;
pub mod platform;
pub mod progress;
pub mod view;

pub use cancel::CancelToken;
pub use catalog::Catalog;
pub use config::AppConfig;
pub use error::Error;
pub use index::{SearchIndex, SearchRequest, SearchResponse};
pub use outcome::BatchOutcome;
pub use progress::{ProgressReporter, SilentReporter};
pub use view::ViewBuilder;
