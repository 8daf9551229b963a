use std::sync::Arc;

use crate::application::jobs::JobQueue;
use crate::application::repos::{EngagementRepo, PostsRepo, PostsWriteRepo};

use super::engagement::EngagementService;

#[derive(Clone)]
pub struct PostService {
    pub(crate) reader: Arc<dyn PostsRepo>,
    pub(crate) writer: Arc<dyn PostsWriteRepo>,
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) engagement: EngagementService,
    pub(crate) job_priority: i32,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        engagement: Arc<dyn EngagementRepo>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let engagement = EngagementService::new(reader.clone(), engagement);
        Self {
            reader,
            writer,
            queue,
            engagement,
            job_priority: 0,
        }
    }

    pub fn with_job_priority(mut self, priority: i32) -> Self {
        self.job_priority = priority;
        self
    }

    pub fn engagement(&self) -> &EngagementService {
        &self.engagement
    }
}
