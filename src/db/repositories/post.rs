use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::constants::pagination::MAX_LIMIT;
use crate::db::StoreError;
use crate::db::executor::{DataAccessError, SessionExecutor};
use crate::entities::posts;
use crate::models::post::{Post, PostDraft, PostPatch};

#[derive(Clone)]
pub struct PostRepository {
    executor: SessionExecutor,
    seed_guard: Arc<Mutex<()>>,
}

impl PostRepository {
    #[must_use]
    pub fn new(executor: SessionExecutor) -> Self {
        Self {
            executor,
            seed_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Newest first by id. `limit` is clamped to `1..=100`.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<Vec<Post>, DataAccessError> {
        let limit = limit.clamp(1, MAX_LIMIT);

        self.executor
            .run("posts.list", move |txn| {
                Box::pin(fetch_page(txn, offset, limit))
            })
            .await
    }

    pub async fn get(&self, id: i32) -> Result<Option<Post>, DataAccessError> {
        self.executor
            .run("posts.get", move |txn| Box::pin(fetch_one(txn, id)))
            .await
    }

    pub async fn create(
        &self,
        title: &str,
        content: &str,
        author: &str,
    ) -> Result<Post, StoreError> {
        let draft = PostDraft::new(title, content, author)?;
        let now = Utc::now().trunc_subsecs(6);

        let post = self
            .executor
            .run("posts.create", move |txn| {
                Box::pin(insert_draft(txn, draft, now))
            })
            .await?;

        Ok(post)
    }

    /// Applies only the fields present in `patch`. `Ok(None)` means no such post.
    pub async fn update(&self, id: i32, patch: PostPatch) -> Result<Option<Post>, StoreError> {
        patch.validate()?;

        let post = self
            .executor
            .run("posts.update", move |txn| {
                Box::pin(apply_patch(txn, id, patch))
            })
            .await?;

        Ok(post)
    }

    /// `true` if a row existed and was removed.
    pub async fn delete(&self, id: i32) -> Result<bool, DataAccessError> {
        self.executor
            .run("posts.delete", move |txn| Box::pin(delete_one(txn, id)))
            .await
    }

    pub async fn count(&self) -> Result<u64, DataAccessError> {
        self.executor
            .run("posts.count", |txn| {
                Box::pin(posts::Entity::find().count(txn))
            })
            .await
    }

    /// Inserts `samples` only when the table is empty. Returns how many rows were added.
    ///
    /// The emptiness check and the inserts share one unit of work, and callers in
    /// this process are serialized. Separate processes racing this call may each
    /// seed once.
    pub async fn ensure_seed_data(&self, samples: Vec<PostDraft>) -> Result<usize, DataAccessError> {
        let _guard = self.seed_guard.lock().await;

        self.executor
            .run("posts.seed", move |txn| Box::pin(seed_if_empty(txn, samples)))
            .await
    }
}

async fn fetch_page(
    txn: &DatabaseTransaction,
    offset: u64,
    limit: u64,
) -> Result<Vec<Post>, DbErr> {
    let rows = posts::Entity::find()
        .order_by_desc(posts::Column::Id)
        .offset(offset)
        .limit(limit)
        .all(txn)
        .await?;

    Ok(rows.into_iter().map(Post::from).collect())
}

async fn fetch_one(txn: &DatabaseTransaction, id: i32) -> Result<Option<Post>, DbErr> {
    let row = posts::Entity::find_by_id(id).one(txn).await?;
    Ok(row.map(Post::from))
}

async fn insert_draft(
    txn: &DatabaseTransaction,
    draft: PostDraft,
    now: DateTime<Utc>,
) -> Result<Post, DbErr> {
    let model = posts::ActiveModel {
        title: Set(draft.title().to_string()),
        content: Set(draft.content().to_string()),
        author: Set(draft.author().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    Ok(Post::from(model))
}

async fn apply_patch(
    txn: &DatabaseTransaction,
    id: i32,
    patch: PostPatch,
) -> Result<Option<Post>, DbErr> {
    let Some(existing) = posts::Entity::find_by_id(id).one(txn).await? else {
        return Ok(None);
    };

    let updated_at = next_timestamp(existing.updated_at);
    let mut active: posts::ActiveModel = existing.into();

    if let Some(title) = patch.title {
        active.title = Set(title);
    }
    if let Some(content) = patch.content {
        active.content = Set(content);
    }
    active.updated_at = Set(updated_at);

    let model = active.update(txn).await?;
    Ok(Some(Post::from(model)))
}

async fn delete_one(txn: &DatabaseTransaction, id: i32) -> Result<bool, DbErr> {
    let result = posts::Entity::delete_by_id(id).exec(txn).await?;
    Ok(result.rows_affected > 0)
}

async fn seed_if_empty(txn: &DatabaseTransaction, samples: Vec<PostDraft>) -> Result<usize, DbErr> {
    if posts::Entity::find().count(txn).await? > 0 {
        return Ok(0);
    }

    let inserted = samples.len();
    for draft in samples {
        let now = Utc::now().trunc_subsecs(6);
        insert_draft(txn, draft, now).await?;
    }

    Ok(inserted)
}

/// Microsecond-precision "now" that is strictly after `previous`.
///
/// Postgres keeps microseconds, so anything finer could collapse two updates
/// onto the same stored instant.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous.trunc_subsecs(6) + TimeDelta::microseconds(1);
    Utc::now().trunc_subsecs(6).max(floor)
}
