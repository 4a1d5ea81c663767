pub mod watch_navigator;

pub use watch_navigator::WatchNavigator;
