use uuid::Uuid;

use crate::application::listing::{ListingQuery, Pagination, PostListing, page_offset};
use crate::application::repos::PostListFilter;
use crate::domain::entities::PostRecord;
use crate::domain::types::PostStatus;

use super::service::PostService;
use super::types::PostError;

pub const RELATED_POSTS_LIMIT: u32 = 5;

impl PostService {
    pub async fn find_by_id(&self, id: Uuid) -> Result<PostRecord, PostError> {
        self.reader
            .find_by_id(id)
            .await?
            .ok_or(PostError::NotFound)
    }

    /// Load a post by slug on behalf of a reader, counting the view.
    pub async fn find_by_slug(
        &self,
        slug: &str,
        viewer: Option<Uuid>,
    ) -> Result<PostRecord, PostError> {
        self.engagement.read_by_slug(slug, viewer).await
    }

    pub async fn find_related(&self, id: Uuid) -> Result<Vec<PostRecord>, PostError> {
        let post = self.find_by_id(id).await?;
        Ok(self
            .reader
            .find_related(&post, RELATED_POSTS_LIMIT)
            .await?)
    }

    /// An author's posts, newest first. Without a status every post is listed.
    pub async fn list_by_author(
        &self,
        author_id: Uuid,
        status: Option<PostStatus>,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PostListing, PostError> {
        let key = ListingQuery {
            status,
            page,
            limit,
        }
        .normalize();
        let filter = PostListFilter {
            status,
            author_id: Some(author_id),
        };

        let (data, total) = futures::try_join!(
            self.reader
                .list_posts(&filter, page_offset(key.page, key.limit), key.limit),
            self.reader.count_posts(&filter),
        )?;

        Ok(PostListing {
            data,
            pagination: Pagination::new(key.page, key.limit, total),
        })
    }
}
