pub mod fetcher;
pub mod scheduler;

pub use fetcher::ZoneFetcher;
pub use scheduler::{DEFAULT_REFRESH_INTERVAL, RefreshScheduler};
