use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CreatePostParams, EngagementRepo, LikeOutcome, NewCommentParams, POST_SLUG_CONSTRAINT,
    PostListFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, ViewOutcome,
};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::entities::{CommentRecord, PostMeta, PostRecord};
use crate::domain::types::PostStatus;

const SOURCE: &str = "infra::memory::posts";

struct StoredPost {
    seq: u64,
    post: PostRecord,
}

#[derive(Default)]
struct State {
    posts: HashMap<Uuid, StoredPost>,
    slugs: HashMap<String, Uuid>,
    next_seq: u64,
}

impl State {
    fn get_mut(&mut self, id: Uuid) -> Result<&mut PostRecord, RepoError> {
        self.posts
            .get_mut(&id)
            .map(|stored| &mut stored.post)
            .ok_or(RepoError::NotFound)
    }

    /// Newest first, ties broken by insertion order.
    fn matching(&self, filter: impl Fn(&PostRecord) -> bool) -> Vec<&StoredPost> {
        let mut matches: Vec<&StoredPost> = self
            .posts
            .values()
            .filter(|stored| filter(&stored.post))
            .collect();
        matches.sort_by(|a, b| {
            b.post
                .created_at
                .cmp(&a.post.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        matches
    }

    fn slug_taken_by_other(&self, slug: &str, id: Uuid) -> bool {
        self.slugs.get(slug).is_some_and(|owner| *owner != id)
    }
}

fn duplicate_slug() -> RepoError {
    RepoError::Duplicate {
        constraint: POST_SLUG_CONSTRAINT.to_string(),
    }
}

fn matches_filter(post: &PostRecord, filter: &PostListFilter) -> bool {
    filter.status.is_none_or(|status| post.status == status)
        && filter.author_id.is_none_or(|author| post.author_id == author)
}

#[derive(Default)]
pub struct MemoryPostStore {
    state: RwLock<State>,
    queries: AtomicU64,
    query_delay: Mutex<Option<Duration>>,
    fail_excerpt_updates: AtomicBool,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listing and count queries served so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make listing queries take this long, so concurrent readers overlap.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        *mutex_lock(&self.query_delay, SOURCE, "set_query_delay") = delay;
    }

    pub fn set_fail_excerpt_updates(&self, fail: bool) {
        self.fail_excerpt_updates.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_query(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = *mutex_lock(&self.query_delay, SOURCE, "simulate_query");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PostsRepo for MemoryPostStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_by_id");
        Ok(state.posts.get(&id).map(|stored| stored.post.clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_by_slug");
        Ok(state
            .slugs
            .get(slug)
            .and_then(|id| state.posts.get(id))
            .map(|stored| stored.post.clone()))
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.simulate_query().await;
        let state = rw_read(&self.state, SOURCE, "list_posts");
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(state
            .matching(|post| matches_filter(post, filter))
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .map(|stored| stored.post.clone())
            .collect())
    }

    async fn count_posts(&self, filter: &PostListFilter) -> Result<u64, RepoError> {
        self.simulate_query().await;
        let state = rw_read(&self.state, SOURCE, "count_posts");
        Ok(state
            .posts
            .values()
            .filter(|stored| matches_filter(&stored.post, filter))
            .count() as u64)
    }

    async fn find_related(
        &self,
        post: &PostRecord,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_related");
        Ok(state
            .matching(|candidate| {
                candidate.id != post.id
                    && candidate.status == PostStatus::Published
                    && (candidate.author_id == post.author_id
                        || candidate.tags.iter().any(|tag| post.tags.contains(tag)))
            })
            .into_iter()
            .take(limit as usize)
            .map(|stored| stored.post.clone())
            .collect())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryPostStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        // a round-trip boundary, so concurrent writers interleave like they would against a server
        tokio::task::yield_now().await;

        let mut state = rw_write(&self.state, SOURCE, "create_post");
        if state.slugs.contains_key(&params.slug) {
            return Err(duplicate_slug());
        }
        if state.posts.contains_key(&params.id) {
            return Err(RepoError::Duplicate {
                constraint: "posts_pkey".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        let post = PostRecord {
            id: params.id,
            author_id: params.author_id,
            title: params.title,
            content: params.content,
            slug: params.slug,
            status: params.status,
            tags: params.tags,
            featured_image: params.featured_image,
            excerpt: params.excerpt,
            reading_time: params.reading_time,
            likes: Vec::new(),
            viewed_by: Vec::new(),
            meta: PostMeta::default(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.slugs.insert(post.slug.clone(), post.id);
        state.posts.insert(
            post.id,
            StoredPost {
                seq,
                post: post.clone(),
            },
        );
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        tokio::task::yield_now().await;

        let mut state = rw_write(&self.state, SOURCE, "update_post");
        if state.slug_taken_by_other(&params.slug, params.id) {
            return Err(duplicate_slug());
        }

        let post = state.get_mut(params.id)?;
        let previous_slug = std::mem::replace(&mut post.slug, params.slug);
        post.title = params.title;
        post.content = params.content;
        post.status = params.status;
        post.tags = params.tags;
        post.featured_image = params.featured_image;
        if let Some(excerpt) = params.excerpt {
            post.excerpt = Some(excerpt);
        }
        post.reading_time = params.reading_time;
        post.updated_at = OffsetDateTime::now_utc();
        let updated = post.clone();

        if previous_slug != updated.slug {
            state.slugs.remove(&previous_slug);
            state.slugs.insert(updated.slug.clone(), updated.id);
        }
        Ok(updated)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "delete_post");
        let stored = state.posts.remove(&id).ok_or(RepoError::NotFound)?;
        state.slugs.remove(&stored.post.slug);
        Ok(())
    }

    async fn update_excerpt(&self, id: Uuid, excerpt: &str) -> Result<(), RepoError> {
        if self.fail_excerpt_updates.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("excerpt writes disabled"));
        }
        let mut state = rw_write(&self.state, SOURCE, "update_excerpt");
        state.get_mut(id)?.excerpt = Some(excerpt.to_string());
        Ok(())
    }
}

#[async_trait]
impl EngagementRepo for MemoryPostStore {
    async fn record_view(&self, id: Uuid, viewer: Option<Uuid>) -> Result<ViewOutcome, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "record_view");
        let post = state.get_mut(id)?;
        if let Some(viewer) = viewer {
            if post.viewed_by.contains(&viewer) {
                return Ok(ViewOutcome::AlreadyCounted {
                    views: post.meta.views,
                });
            }
            post.viewed_by.push(viewer);
        }
        post.meta.views += 1;
        Ok(ViewOutcome::Counted {
            views: post.meta.views,
        })
    }

    async fn add_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "add_like");
        let post = state.get_mut(id)?;
        let changed = !post.likes.contains(&user_id);
        if changed {
            post.likes.push(user_id);
        }
        Ok(LikeOutcome {
            changed,
            likes_count: post.likes.len() as u64,
        })
    }

    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "remove_like");
        let post = state.get_mut(id)?;
        let before = post.likes.len();
        post.likes.retain(|liker| *liker != user_id);
        Ok(LikeOutcome {
            changed: post.likes.len() != before,
            likes_count: post.likes.len() as u64,
        })
    }

    async fn add_comment(&self, params: NewCommentParams) -> Result<CommentRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "add_comment");
        let post = state.get_mut(params.post_id)?;
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            content: params.content,
            created_at: OffsetDateTime::now_utc(),
        };
        post.comments.push(comment.clone());
        Ok(comment)
    }

    async fn record_share(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "record_share");
        let post = state.get_mut(id)?;
        post.meta.shares += 1;
        Ok(post.meta.shares)
    }
}
