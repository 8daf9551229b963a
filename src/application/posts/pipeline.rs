//! Pre-save derivation for post mutations.
//!
//! `plan_mutation` is pure: it looks at the stored post (if any) and the
//! validated next state and decides which derived fields to recompute and
//! whether the excerpt should be regenerated. Persisting and enqueueing are
//! left to the service.

use crate::domain::entities::PostRecord;
use crate::domain::posts::{SUMMARY_WORD_DELTA_THRESHOLD, reading_time, word_count};
use crate::domain::slug::{SlugError, derive_slug};

/// Validated author-owned text after applying an edit.
#[derive(Debug, Clone, Copy)]
pub struct PostDraft<'a> {
    pub title: &'a str,
    pub content: &'a str,
    /// Excerpt supplied in this mutation, if any.
    pub excerpt: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPlan {
    /// Present on creation and whenever the title changed.
    pub slug_base: Option<String>,
    pub reading_time: u32,
    pub word_count: usize,
    pub schedule_summary: bool,
}

pub fn plan_mutation(
    previous: Option<&PostRecord>,
    next: PostDraft<'_>,
) -> Result<MutationPlan, SlugError> {
    let title_changed = previous.is_none_or(|post| post.title != next.title);
    let slug_base = if title_changed {
        Some(derive_slug(next.title)?)
    } else {
        None
    };

    let words = word_count(next.content);
    let schedule_summary = match previous {
        None => next.excerpt.is_none(),
        Some(post) if post.content != next.content => {
            let has_excerpt = next.excerpt.is_some() || post.excerpt.is_some();
            let delta = word_count(&post.content).abs_diff(words);
            !has_excerpt || delta > SUMMARY_WORD_DELTA_THRESHOLD
        }
        Some(_) => false,
    };

    Ok(MutationPlan {
        slug_base,
        reading_time: reading_time(next.content),
        word_count: words,
        schedule_summary,
    })
}
