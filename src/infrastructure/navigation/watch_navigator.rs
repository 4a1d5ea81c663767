use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::application::ports::SignInNavigator;

/// 現在のパスを watch チャネルで公開するナビゲーター
///
/// 画面側は `subscribe` した受信側でリダイレクトを検知する。
pub struct WatchNavigator {
    path: watch::Sender<String>,
    redirects: AtomicUsize,
}

impl WatchNavigator {
    pub fn new(initial_path: impl Into<String>) -> Self {
        let (path, _) = watch::channel(initial_path.into());
        Self {
            path,
            redirects: AtomicUsize::new(0),
        }
    }

    /// 画面遷移を反映する
    pub fn set_path(&self, path: impl Into<String>) {
        self.path.send_replace(path.into());
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.path.subscribe()
    }

    pub fn redirect_count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl SignInNavigator for WatchNavigator {
    fn current_path(&self) -> Option<String> {
        Some(self.path.borrow().clone())
    }

    fn redirect_to(&self, path: &str) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
        debug!(path, "navigating");
        self.path.send_replace(path.to_string());
    }
}
