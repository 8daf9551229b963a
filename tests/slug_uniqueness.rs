use std::collections::HashSet;
use std::sync::Arc;

use scriptorium::application::jobs::QueuePolicy;
use scriptorium::application::posts::{CreatePostCommand, PostService};
use scriptorium::domain::types::PostStatus;
use scriptorium::infra::memory::{MemoryJobQueue, MemoryPostStore};
use uuid::Uuid;

fn service(store: &Arc<MemoryPostStore>) -> PostService {
    let queue = Arc::new(MemoryJobQueue::new("slugs", QueuePolicy::default()));
    PostService::new(store.clone(), store.clone(), store.clone(), queue)
}

fn command(title: &str) -> CreatePostCommand {
    CreatePostCommand {
        author_id: Uuid::new_v4(),
        title: title.to_string(),
        content: "Plenty of words to satisfy validation.".to_string(),
        status: PostStatus::Draft,
        tags: Vec::new(),
        featured_image: None,
        excerpt: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_with_one_title_get_distinct_slugs() {
    let store = Arc::new(MemoryPostStore::new());
    let posts = service(&store);

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let posts = posts.clone();
            tokio::spawn(async move { posts.create_post(command("Same Title")).await })
        })
        .collect();

    let mut slugs = HashSet::new();
    for handle in handles {
        let mutation = handle.await.expect("join").expect("create");
        assert!(
            mutation.post.slug == "same-title" || mutation.post.slug.starts_with("same-title-"),
            "unexpected slug {}",
            mutation.post.slug
        );
        assert!(slugs.insert(mutation.post.slug));
    }

    assert_eq!(slugs.len(), 12);
    assert_eq!(store.len(), 12);
    assert!(slugs.contains("same-title"));
}

#[tokio::test]
async fn sequential_creates_count_up_from_one() {
    let store = Arc::new(MemoryPostStore::new());
    let posts = service(&store);

    let mut slugs = Vec::new();
    for _ in 0..3 {
        slugs.push(
            posts
                .create_post(command("Rust Notes"))
                .await
                .expect("create")
                .post
                .slug,
        );
    }
    assert_eq!(slugs, ["rust-notes", "rust-notes-1", "rust-notes-2"]);
}

#[tokio::test]
async fn non_latin_titles_are_transliterated() {
    let store = Arc::new(MemoryPostStore::new());
    let posts = service(&store);

    let created = posts
        .create_post(command("你好 世界"))
        .await
        .expect("create");
    assert_eq!(created.post.slug, "ni-hao-shi-jie");
}
