use std::sync::Arc;

use scriptorium::application::jobs::QueuePolicy;
use scriptorium::application::posts::{CreatePostCommand, PostError, PostService};
use scriptorium::application::repos::ViewOutcome;
use scriptorium::domain::entities::PostRecord;
use scriptorium::domain::types::PostStatus;
use scriptorium::infra::memory::{MemoryJobQueue, MemoryPostStore};
use uuid::Uuid;

async fn published(posts: &PostService, title: &str, tags: &[&str]) -> PostRecord {
    posts
        .create_post(CreatePostCommand {
            author_id: Uuid::new_v4(),
            title: title.to_string(),
            content: "A readable body for engagement tests.".to_string(),
            status: PostStatus::Published,
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            featured_image: Some("https://img.example.com/cover.png".to_string()),
            excerpt: Some("Pre-written.".to_string()),
        })
        .await
        .expect("create")
        .post
}

fn service() -> PostService {
    let store = Arc::new(MemoryPostStore::new());
    let queue = Arc::new(MemoryJobQueue::new("engagement", QueuePolicy::default()));
    PostService::new(store.clone(), store.clone(), store, queue)
}

#[tokio::test]
async fn signed_in_reader_is_counted_once() {
    let posts = service();
    let post = published(&posts, "Counted Once", &["rust"]).await;
    let reader = Uuid::new_v4();

    let first = posts
        .find_by_slug(&post.slug, Some(reader))
        .await
        .expect("first read");
    assert_eq!(first.meta.views, 1);
    assert_eq!(first.viewed_by, vec![reader]);

    let second = posts
        .find_by_slug(&post.slug, Some(reader))
        .await
        .expect("second read");
    assert_eq!(second.meta.views, 1);
    assert_eq!(second.viewed_by, vec![reader]);

    let outcome = posts
        .engagement()
        .record_view(post.id, Some(Uuid::new_v4()))
        .await
        .expect("other reader");
    assert_eq!(outcome, ViewOutcome::Counted { views: 2 });
}

#[tokio::test]
async fn anonymous_views_always_count() {
    let posts = service();
    let post = published(&posts, "Anonymous Reads", &["rust"]).await;

    for expected in 1..=3 {
        let read = posts.find_by_slug(&post.slug, None).await.expect("read");
        assert_eq!(read.meta.views, expected);
        assert!(read.viewed_by.is_empty());
    }
}

#[tokio::test]
async fn unknown_slug_is_not_found() {
    let posts = service();
    assert!(matches!(
        posts.find_by_slug("missing", None).await,
        Err(PostError::NotFound)
    ));
}

#[tokio::test]
async fn likes_comments_and_shares_accumulate() {
    let posts = service();
    let post = published(&posts, "Social Post", &["rust"]).await;
    let engagement = posts.engagement();
    let fan = Uuid::new_v4();

    assert_eq!(engagement.like(post.id, fan).await.expect("like").likes_count, 1);
    assert!(!engagement.like(post.id, fan).await.expect("like again").changed);
    assert_eq!(engagement.unlike(post.id, fan).await.expect("unlike").likes_count, 0);

    let first = engagement
        .add_comment(post.id, fan, "  First!  ")
        .await
        .expect("comment");
    assert_eq!(first.content, "First!");
    engagement
        .add_comment(post.id, Uuid::new_v4(), "Second")
        .await
        .expect("comment");
    let err = engagement
        .add_comment(post.id, fan, "   ")
        .await
        .expect_err("blank comment");
    assert!(matches!(err, PostError::Validation(_)));

    assert_eq!(engagement.record_share(post.id).await.expect("share"), 1);
    assert_eq!(engagement.record_share(post.id).await.expect("share"), 2);

    let stored = posts.find_by_id(post.id).await.expect("find");
    assert_eq!(stored.comments_count(), 2);
    assert_eq!(stored.comments[0].content, "First!");
    assert_eq!(stored.comments[1].content, "Second");
    assert_eq!(stored.meta.shares, 2);
    assert_eq!(stored.likes_count(), 0);
    assert_eq!(stored.updated_at, post.updated_at);
}

#[tokio::test]
async fn related_posts_share_a_tag_or_author() {
    let posts = service();
    let origin = published(&posts, "Origin Post", &["rust", "async"]).await;
    let same_tag = published(&posts, "Tagged Sibling", &["async"]).await;
    published(&posts, "Unrelated", &["cooking"]).await;

    let related = posts.find_related(origin.id).await.expect("related");
    let ids: Vec<Uuid> = related.iter().map(|post| post.id).collect();
    assert_eq!(ids, vec![same_tag.id]);
}

#[tokio::test]
async fn author_listing_filters_by_status() {
    let posts = service();
    let author = Uuid::new_v4();
    for (title, status) in [
        ("Author Draft", PostStatus::Draft),
        ("Author Live", PostStatus::Published),
        ("Author Live Two", PostStatus::Published),
    ] {
        posts
            .create_post(CreatePostCommand {
                author_id: author,
                title: title.to_string(),
                content: "Some content for the author.".to_string(),
                status,
                tags: Vec::new(),
                featured_image: None,
                excerpt: Some("Manual.".to_string()),
            })
            .await
            .expect("create");
    }
    published(&posts, "Someone Else", &[]).await;

    let all = posts
        .list_by_author(author, None, None, None)
        .await
        .expect("all");
    assert_eq!(all.pagination.total, 3);

    let live = posts
        .list_by_author(author, Some(PostStatus::Published), Some(1), Some(1))
        .await
        .expect("published");
    assert_eq!(live.pagination.total, 2);
    assert_eq!(live.pagination.pages, 2);
    assert_eq!(live.data.len(), 1);
    assert_eq!(live.data[0].title, "Author Live Two");
}
