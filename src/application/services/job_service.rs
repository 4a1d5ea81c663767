use crate::application::ports::StoreScope;
use crate::application::services::api_client::ApiClient;
use crate::application::services::optimistic_update_service::OptimisticUpdateManager;
use crate::application::services::storage_service::StorageService;
use crate::domain::constants::{JOBS_PATH, SAVED_JOBS_KEY, SAVED_JOBS_PATH};
use crate::domain::entities::{
    HttpMethod, Job, JobPage, OperationKind, OptimisticUpdateDraft, RequestDescriptor,
};
use crate::domain::value_objects::{EntityId, EntityType};
use crate::shared::error::{AppError, Result};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

type SavedJobs = Arc<Mutex<Vec<Job>>>;

fn lock_saved(saved: &Mutex<Vec<Job>>) -> MutexGuard<'_, Vec<Job>> {
    saved.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 求人カタログと保存済み求人リスト
pub struct JobService {
    api: ApiClient,
    storage: Arc<StorageService>,
    optimistic: Arc<OptimisticUpdateManager>,
    saved: SavedJobs,
}

impl JobService {
    pub fn new(
        api: ApiClient,
        storage: Arc<StorageService>,
        optimistic: Arc<OptimisticUpdateManager>,
    ) -> Self {
        Self {
            api,
            storage,
            optimistic,
            saved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn entity_type() -> EntityType {
        EntityType::job()
    }

    fn entity_id(job_id: &str) -> Result<EntityId> {
        EntityId::new(job_id.to_string()).map_err(AppError::ValidationError)
    }

    pub async fn list_jobs(&self, page: u32) -> Result<JobPage> {
        self.api
            .fetch_json(RequestDescriptor::get(JOBS_PATH).with_param("page", page))
            .await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let id = Self::entity_id(job_id)?;
        self.api.get_json(&format!("{JOBS_PATH}/{id}")).await
    }

    pub fn saved_jobs(&self) -> Vec<Job> {
        lock_saved(&self.saved).clone()
    }

    pub fn is_saved(&self, job_id: &str) -> bool {
        lock_saved(&self.saved).iter().any(|job| job.id == job_id)
    }

    /// 保存／解除の通信中は true
    pub fn is_saving(&self, job_id: &str) -> bool {
        match Self::entity_id(job_id) {
            Ok(id) => self.optimistic.has_pending_update(&Self::entity_type(), Some(&id)),
            Err(_) => false,
        }
    }

    /// 永続ストアから保存済みリストを読み込む
    pub async fn load_saved_jobs(&self) -> usize {
        let jobs: Vec<Job> = self
            .storage
            .get(StoreScope::Durable, SAVED_JOBS_KEY)
            .await
            .unwrap_or_default();
        let count = jobs.len();
        *lock_saved(&self.saved) = jobs;
        count
    }

    /// サーバーの保存済みリストで置き換える
    pub async fn sync_saved_jobs(&self) -> Result<Vec<Job>> {
        let jobs: Vec<Job> = self.api.get_json(SAVED_JOBS_PATH).await?;
        *lock_saved(&self.saved) = jobs.clone();
        self.persist().await;
        Ok(jobs)
    }

    pub async fn save_job(&self, job: Job) -> Result<()> {
        let id = Self::entity_id(&job.id)?;
        self.ensure_not_saving(&id)?;
        if self.is_saved(&job.id) {
            return Ok(());
        }

        lock_saved(&self.saved).push(job.clone());

        let saved = Arc::clone(&self.saved);
        let job_id = job.id.clone();
        let draft = OptimisticUpdateDraft::new(OperationKind::Create, Self::entity_type(), json!(job))
            .with_entity_id(id.clone())
            .with_rollback(move |_| {
                lock_saved(&saved).retain(|saved| saved.id != job_id);
            });

        let request = RequestDescriptor::new(HttpMethod::Post, format!("{JOBS_PATH}/{id}/save"));
        let result = self
            .optimistic
            .run(draft, async { self.api.send(request).await.map(|response| response.body) })
            .await;

        self.settle(&id, "saved", result).await
    }

    pub async fn unsave_job(&self, job_id: &str) -> Result<()> {
        let id = Self::entity_id(job_id)?;
        self.ensure_not_saving(&id)?;

        let removed = {
            let mut saved = lock_saved(&self.saved);
            saved
                .iter()
                .position(|job| job.id == job_id)
                .map(|index| (index, saved.remove(index)))
        };
        let Some((index, job)) = removed else {
            return Ok(());
        };

        let saved = Arc::clone(&self.saved);
        let restored = job.clone();
        let draft = OptimisticUpdateDraft::new(OperationKind::Delete, Self::entity_type(), json!(null))
            .with_entity_id(id.clone())
            .with_previous_data(json!(job))
            .with_rollback(move |_| {
                let mut saved = lock_saved(&saved);
                if !saved.iter().any(|job| job.id == restored.id) {
                    let index = index.min(saved.len());
                    saved.insert(index, restored);
                }
            });

        let request = RequestDescriptor::delete(format!("{JOBS_PATH}/{id}/save"));
        let result = self
            .optimistic
            .run(draft, async { self.api.send(request).await.map(|response| response.body) })
            .await;

        self.settle(&id, "unsaved", result).await
    }

    fn ensure_not_saving(&self, id: &EntityId) -> Result<()> {
        if self.optimistic.has_pending_update(&Self::entity_type(), Some(id)) {
            return Err(AppError::ValidationError(format!(
                "job {id} already has a pending change"
            )));
        }
        Ok(())
    }

    async fn settle<T>(&self, id: &EntityId, action: &str, result: Result<T>) -> Result<()> {
        self.persist().await;
        match result {
            Ok(_) => {
                let invalidated = self
                    .api
                    .deduplicator()
                    .invalidate_cache(&format!("GET:{SAVED_JOBS_PATH}"));
                info!(job_id = %id, action, invalidated, "saved jobs updated");
                Ok(())
            }
            Err(err) => {
                debug!(job_id = %id, action, error = %err, "saved jobs change rolled back");
                Err(err)
            }
        }
    }

    async fn persist(&self) {
        let jobs = self.saved_jobs();
        self.storage.set(StoreScope::Durable, SAVED_JOBS_KEY, &jobs).await;
    }
}
