//! Post authoring and reading services.

mod commands;
mod engagement;
mod pipeline;
mod queries;
mod service;
pub mod types;

pub use engagement::EngagementService;
pub use pipeline::{MutationPlan, PostDraft, plan_mutation};
pub use queries::RELATED_POSTS_LIMIT;
pub use service::PostService;
pub use types::{CreatePostCommand, Enrichment, PostError, PostMutation, UpdatePostCommand};
