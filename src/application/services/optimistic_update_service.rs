use crate::domain::entities::{
    OptimisticUpdate, OptimisticUpdateDraft, RollbackAction, UpdateStatus,
};
use crate::domain::value_objects::{EntityId, EntityType, OptimisticUpdateId};
use crate::shared::config::OptimisticConfig;
use crate::shared::error::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 変更のたびに追跡中の更新一覧を受け取るリスナー
pub type UpdateListener = Arc<dyn Fn(&[OptimisticUpdate]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct TrackedUpdate {
    update: OptimisticUpdate,
    rollback: Option<RollbackAction>,
    seq: u64,
}

#[derive(Default)]
struct ManagerState {
    updates: HashMap<OptimisticUpdateId, TrackedUpdate>,
    next_seq: u64,
}

impl ManagerState {
    fn snapshot(&self) -> Vec<OptimisticUpdate> {
        let mut tracked: Vec<&TrackedUpdate> = self.updates.values().collect();
        tracked.sort_by_key(|tracked| tracked.seq);
        tracked.into_iter().map(|tracked| tracked.update.clone()).collect()
    }
}

struct ManagerInner {
    state: Mutex<ManagerState>,
    listeners: Mutex<Vec<(SubscriptionId, UpdateListener)>>,
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(SubscriptionId, UpdateListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// ロックを解放してからリスナーを呼ぶ
    fn notify(&self) {
        let snapshot = self.lock_state().snapshot();
        let listeners: Vec<UpdateListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// 同じ id で登録し直された更新は対象外
    fn prune(&self, id: &OptimisticUpdateId, seq: u64) {
        let removed = {
            let mut state = self.lock_state();
            let settled = state
                .updates
                .get(id)
                .map(|tracked| tracked.seq == seq && tracked.update.status.is_terminal())
                .unwrap_or(false);
            settled && state.updates.remove(id).is_some()
        };
        if removed {
            debug!(update_id = %id, "pruned settled optimistic update");
            self.notify();
        }
    }
}

/// サーバー確認前に適用した変更を追跡し、失敗時にロールバックする
pub struct OptimisticUpdateManager {
    inner: Arc<ManagerInner>,
    next_listener: AtomicU64,
    config: OptimisticConfig,
}

impl OptimisticUpdateManager {
    pub fn new(config: OptimisticConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState::default()),
                listeners: Mutex::new(Vec::new()),
            }),
            next_listener: AtomicU64::new(0),
            config,
        }
    }

    pub fn add_update(&self, draft: OptimisticUpdateDraft) -> OptimisticUpdateId {
        let id = draft.id.unwrap_or_else(OptimisticUpdateId::generate);
        let update = OptimisticUpdate {
            id: id.clone(),
            kind: draft.kind,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            optimistic_data: draft.optimistic_data,
            previous_data: draft.previous_data,
            status: UpdateStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        };

        {
            let mut state = self.inner.lock_state();
            let seq = state.next_seq;
            state.next_seq += 1;
            if state.updates.contains_key(&id) {
                warn!(update_id = %id, "replacing optimistic update with duplicate id");
            }
            state.updates.insert(
                id.clone(),
                TrackedUpdate {
                    update,
                    rollback: draft.rollback,
                    seq,
                },
            );
        }

        debug!(update_id = %id, "registered optimistic update");
        self.inner.notify();
        id
    }

    /// pending 以外の更新には何もしない
    pub fn mark_success(&self, id: &OptimisticUpdateId, server_data: Option<Value>) -> bool {
        let seq = {
            let mut state = self.inner.lock_state();
            let Some(tracked) = state.updates.get_mut(id) else {
                return false;
            };
            if !tracked.update.status.is_pending() {
                return false;
            }
            tracked.update.status = UpdateStatus::Success;
            tracked.update.settled_at = Some(Utc::now());
            if let Some(server_data) = server_data {
                tracked.update.optimistic_data = server_data;
            }
            tracked.rollback = None;
            tracked.seq
        };

        debug!(update_id = %id, "optimistic update confirmed");
        self.inner.notify();
        self.schedule_prune(id.clone(), seq, self.config.success_retention());
        true
    }

    /// ロールバックは呼び出し中に同期的に一度だけ実行される
    pub fn mark_failed(&self, id: &OptimisticUpdateId, error: &str) -> bool {
        let (snapshot, rollback, seq) = {
            let mut state = self.inner.lock_state();
            let Some(tracked) = state.updates.get_mut(id) else {
                return false;
            };
            if !tracked.update.status.is_pending() {
                return false;
            }
            tracked.update.status = UpdateStatus::Failed {
                error: error.to_string(),
            };
            tracked.update.settled_at = Some(Utc::now());
            (tracked.update.clone(), tracked.rollback.take(), tracked.seq)
        };

        warn!(update_id = %id, error, "optimistic update failed, rolling back");
        if let Some(rollback) = rollback {
            rollback(&snapshot);
        }

        if let Some(tracked) = self
            .inner
            .lock_state()
            .updates
            .get_mut(id)
            .filter(|tracked| tracked.seq == seq)
        {
            tracked.update.status = UpdateStatus::RolledBack {
                error: error.to_string(),
            };
        }

        self.inner.notify();
        self.schedule_prune(id.clone(), seq, self.config.failure_retention());
        true
    }

    /// 失敗状態を経由せずにロールバックして取り除く
    pub fn cancel_update(&self, id: &OptimisticUpdateId) -> bool {
        let Some(tracked) = self.inner.lock_state().updates.remove(id) else {
            return false;
        };
        if tracked.update.status.is_pending() {
            if let Some(rollback) = tracked.rollback {
                rollback(&tracked.update);
            }
        }
        info!(update_id = %id, "cancelled optimistic update");
        self.inner.notify();
        true
    }

    /// pending の更新をすべてロールバックし、追跡をやめる
    pub fn clear_all(&self) -> usize {
        let mut drained: Vec<TrackedUpdate> = {
            let mut state = self.inner.lock_state();
            state.updates.drain().map(|(_, tracked)| tracked).collect()
        };
        drained.sort_by_key(|tracked| tracked.seq);

        let mut rolled_back = 0;
        for tracked in drained {
            if !tracked.update.status.is_pending() {
                continue;
            }
            if let Some(rollback) = tracked.rollback {
                rollback(&tracked.update);
            }
            rolled_back += 1;
        }

        if rolled_back > 0 {
            info!(count = rolled_back, "rolled back pending optimistic updates");
        }
        self.inner.notify();
        rolled_back
    }

    pub fn all_updates(&self) -> Vec<OptimisticUpdate> {
        self.inner.lock_state().snapshot()
    }

    pub fn pending_updates(&self) -> Vec<OptimisticUpdate> {
        self.all_updates()
            .into_iter()
            .filter(|update| update.status.is_pending())
            .collect()
    }

    pub fn updates_for(&self, entity_type: &EntityType) -> Vec<OptimisticUpdate> {
        self.all_updates()
            .into_iter()
            .filter(|update| update.targets(entity_type, None))
            .collect()
    }

    /// 競合する操作を無効化するための判定。id 省略時は型だけで判定する
    pub fn has_pending_update(&self, entity_type: &EntityType, entity_id: Option<&EntityId>) -> bool {
        self.inner
            .lock_state()
            .updates
            .values()
            .any(|tracked| {
                tracked.update.status.is_pending() && tracked.update.targets(entity_type, entity_id)
            })
    }

    pub fn get_update(&self, id: &OptimisticUpdateId) -> Option<OptimisticUpdate> {
        self.inner
            .lock_state()
            .updates
            .get(id)
            .map(|tracked| tracked.update.clone())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&[OptimisticUpdate]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// 更新を登録してサーバー呼び出しを待ち、結果に応じて確定またはロールバックする
    ///
    /// 結果が出る前に future が破棄された場合、pending のままの更新は取り消される。
    pub async fn run<T, Fut>(&self, draft: OptimisticUpdateDraft, server_call: Fut) -> Result<T>
    where
        T: Serialize,
        Fut: Future<Output = Result<T>>,
    {
        let id = self.add_update(draft);
        let _abandoned = AbandonGuard {
            manager: self,
            id: id.clone(),
        };
        match server_call.await {
            Ok(value) => {
                let server_data = serde_json::to_value(&value).ok().filter(|v| !v.is_null());
                self.mark_success(&id, server_data);
                Ok(value)
            }
            Err(err) => {
                self.mark_failed(&id, &err.to_string());
                Err(err)
            }
        }
    }

    fn schedule_prune(&self, id: OptimisticUpdateId, seq: u64, delay: Duration) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.prune(&id, seq);
                });
            }
            Err(_) => self.inner.prune(&id, seq),
        }
    }

    fn is_pending(&self, id: &OptimisticUpdateId) -> bool {
        self.inner
            .lock_state()
            .updates
            .get(id)
            .map(|tracked| tracked.update.status.is_pending())
            .unwrap_or(false)
    }
}

/// `run` の future が途中で破棄されたときに pending の更新を取り消す
struct AbandonGuard<'a> {
    manager: &'a OptimisticUpdateManager,
    id: OptimisticUpdateId,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.manager.is_pending(&self.id) {
            warn!(update_id = %self.id, "optimistic update abandoned before settling");
            self.manager.cancel_update(&self.id);
        }
    }
}
