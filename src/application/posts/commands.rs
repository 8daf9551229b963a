use std::future::Future;

use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::jobs::enqueue_summarization_job;
use crate::application::repos::{CreatePostParams, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::domain::posts::{
    normalize_tags, validate_content, validate_excerpt, validate_featured_image, validate_title,
};
use crate::domain::slug::{
    MAX_SUFFIX_ATTEMPTS, SlugAsyncError, SlugCandidate, SlugError, find_unique_slug,
};

use super::pipeline::{PostDraft, plan_mutation};
use super::service::PostService;
use super::types::{CreatePostCommand, Enrichment, PostError, PostMutation, UpdatePostCommand};

impl PostService {
    pub async fn create_post(&self, command: CreatePostCommand) -> Result<PostMutation, PostError> {
        let title = validate_title(&command.title)?;
        validate_content(&command.content)?;
        let tags = normalize_tags(&command.tags)?;
        let featured_image = command
            .featured_image
            .as_deref()
            .map(validate_featured_image)
            .transpose()?;
        let excerpt = command
            .excerpt
            .as_deref()
            .map(validate_excerpt)
            .transpose()?;

        let plan = plan_mutation(
            None,
            PostDraft {
                title: &title,
                content: &command.content,
                excerpt: excerpt.as_deref(),
            },
        )?;
        let slug_base = plan.slug_base.clone().ok_or(SlugError::EmptyInput)?;

        let id = Uuid::new_v4();
        let template = CreatePostParams {
            id,
            author_id: command.author_id,
            title,
            content: command.content,
            slug: String::new(),
            status: command.status,
            tags,
            featured_image,
            excerpt,
            reading_time: plan.reading_time,
        };

        let post = self
            .write_with_unique_slug(&slug_base, id, |slug| {
                let writer = self.writer.clone();
                let params = CreatePostParams {
                    slug,
                    ..template.clone()
                };
                async move { writer.create_post(params).await }
            })
            .await?;

        info!(
            target = "application::posts::create_post",
            post_id = %post.id,
            author_id = %post.author_id,
            slug = %post.slug,
            reading_time = post.reading_time,
            "post created"
        );

        let enrichment = self.after_commit(&post, plan.schedule_summary).await;
        Ok(PostMutation { post, enrichment })
    }

    pub async fn update_post(
        &self,
        actor: Uuid,
        command: UpdatePostCommand,
    ) -> Result<PostMutation, PostError> {
        let existing = self
            .reader
            .find_by_id(command.id)
            .await?
            .ok_or(PostError::NotFound)?;
        if !existing.is_author(actor) {
            return Err(PostError::Forbidden { user_id: actor });
        }

        let title = match command.title.as_deref() {
            Some(title) => validate_title(title)?,
            None => existing.title.clone(),
        };
        let content = match command.content {
            Some(content) => {
                validate_content(&content)?;
                content
            }
            None => existing.content.clone(),
        };
        let tags = match command.tags.as_deref() {
            Some(tags) => normalize_tags(tags)?,
            None => existing.tags.clone(),
        };
        let featured_image = match command.featured_image.as_deref() {
            Some(raw) => Some(validate_featured_image(raw)?),
            None => existing.featured_image.clone(),
        };
        let excerpt = command
            .excerpt
            .as_deref()
            .map(validate_excerpt)
            .transpose()?;

        let plan = plan_mutation(
            Some(&existing),
            PostDraft {
                title: &title,
                content: &content,
                excerpt: excerpt.as_deref(),
            },
        )?;

        let template = UpdatePostParams {
            id: existing.id,
            title,
            content,
            slug: existing.slug.clone(),
            status: command.status.unwrap_or(existing.status),
            tags,
            featured_image,
            excerpt,
            reading_time: plan.reading_time,
        };

        let post = match plan.slug_base.as_deref() {
            Some(base) => {
                self.write_with_unique_slug(base, existing.id, |slug| {
                    let writer = self.writer.clone();
                    let params = UpdatePostParams {
                        slug,
                        ..template.clone()
                    };
                    async move { writer.update_post(params).await }
                })
                .await?
            }
            None => self.writer.update_post(template).await?,
        };

        info!(
            target = "application::posts::update_post",
            post_id = %post.id,
            slug = %post.slug,
            reading_time = post.reading_time,
            "post updated"
        );

        let enrichment = self.after_commit(&post, plan.schedule_summary).await;
        Ok(PostMutation { post, enrichment })
    }

    pub async fn delete_post(&self, actor: Uuid, id: Uuid) -> Result<(), PostError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound)?;
        if !existing.is_author(actor) {
            return Err(PostError::Forbidden { user_id: actor });
        }

        self.writer.delete_post(id).await?;
        info!(
            target = "application::posts::delete_post",
            post_id = %id,
            "post deleted"
        );
        Ok(())
    }

    /// Persist through `write`, moving to the next suffix whenever the store
    /// reports a slug conflict.
    async fn write_with_unique_slug<F, Fut>(
        &self,
        base: &str,
        own_id: Uuid,
        mut write: F,
    ) -> Result<PostRecord, PostError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<PostRecord, RepoError>>,
    {
        let mut start = 0;
        loop {
            let candidate = self.next_free_slug(base, start, own_id).await?;
            match write(candidate.slug.clone()).await {
                Ok(post) => return Ok(post),
                Err(err) if err.is_slug_conflict() => {
                    if candidate.counter >= MAX_SUFFIX_ATTEMPTS {
                        return Err(SlugError::Exhausted {
                            base: base.to_string(),
                        }
                        .into());
                    }
                    debug!(
                        target = "application::posts::write_with_unique_slug",
                        slug = %candidate.slug,
                        "slug claimed concurrently; probing next suffix"
                    );
                    start = candidate.counter + 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn next_free_slug(
        &self,
        base: &str,
        start: u32,
        own_id: Uuid,
    ) -> Result<SlugCandidate, PostError> {
        let reader = self.reader.clone();
        find_unique_slug(base, start, move |candidate| {
            let reader = reader.clone();
            async move {
                reader
                    .find_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none_or(|post| post.id == own_id))
            }
        })
        .await
        .map_err(|err| match err {
            SlugAsyncError::Slug(err) => PostError::Slug(err),
            SlugAsyncError::Predicate(err) => PostError::from(err),
        })
    }

    /// Post-commit side effect. Queue failures never fail the mutation.
    async fn after_commit(&self, post: &PostRecord, schedule_summary: bool) -> Enrichment {
        if !schedule_summary {
            return Enrichment::NotNeeded;
        }

        match enqueue_summarization_job(
            self.queue.as_ref(),
            post.id,
            post.content.clone(),
            self.job_priority,
        )
        .await
        {
            Ok(outcome) => {
                debug!(
                    target = "application::posts::after_commit",
                    post_id = %post.id,
                    outcome = ?outcome,
                    "summarization scheduled"
                );
                Enrichment::Scheduled(outcome)
            }
            Err(err) => {
                counter!("scriptorium_summarization_enqueue_failed_total").increment(1);
                warn!(
                    target = "application::posts::after_commit",
                    post_id = %post.id,
                    error = %err,
                    "failed to schedule summarization"
                );
                Enrichment::Unavailable
            }
        }
    }
}
