use crate::shared::error::{AppError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type Waiter<T> = oneshot::Sender<Result<T>>;
type Slot<T> = Arc<Mutex<Option<Vec<Waiter<T>>>>>;

/// 同時に一つだけ実行される非同期処理のスロット
///
/// 処理は独立したタスクで実行され、開始した呼び出しも含めて全員が到着順に
/// 同じ結果を受け取る。呼び出し側の future が破棄されても処理は中断されない。
pub struct SingleFlight<T> {
    slot: Slot<T>,
    started: AtomicU64,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            started: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub fn waiting(&self) -> usize {
        lock(&self.slot).as_ref().map(Vec::len).unwrap_or(0)
    }

    /// これまでに開始された処理の回数
    pub fn flights_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// 実行中の処理があれば結果を待ち、なければ `operation` をタスクとして開始する
    pub async fn run<F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut slot = lock(&self.slot);
            match slot.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    *slot = Some(vec![tx]);
                    true
                }
            }
        };

        if leader {
            self.started.fetch_add(1, Ordering::SeqCst);
            let future = operation();
            let mut guard = SettleGuard {
                slot: Arc::clone(&self.slot),
                settled: false,
            };
            tokio::spawn(async move {
                let result = future.await;
                guard.settle(result);
            });
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AppError::Cancelled(
                "in-flight operation was dropped".to_string(),
            )),
        }
    }
}

fn lock<T>(slot: &Slot<T>) -> MutexGuard<'_, Option<Vec<Waiter<T>>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    slot: Slot<T>,
    settled: bool,
}

impl<T> SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    fn settle(&mut self, result: Result<T>) {
        self.settled = true;
        let waiters = lock(&self.slot).take().unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl<T> Drop for SettleGuard<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        // タスクが panic や abort で終わった場合も待機列を解放する
        if !self.settled {
            self.settle(Err(AppError::Cancelled(
                "in-flight operation was dropped".to_string(),
            )));
        }
    }
}
