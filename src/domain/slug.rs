//! Utilities for generating deterministic, human-friendly slugs.
//!
//! ASCII slugification comes from the `slug` crate; Chinese titles are
//! transliterated through `pinyin` first so “基线对齐” becomes
//! `ji-xian-dui-qi`. Uniqueness is decided by the caller through an async
//! predicate, which keeps this module free of persistence concerns.

use std::future::Future;

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Upper bound on suffix attempts (`base`, `base-1`, … `base-32`).
pub const MAX_SUFFIX_ATTEMPTS: u32 = 32;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors that can occur while probing slugs via an async uniqueness check.
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// A free slug together with the suffix counter that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugCandidate {
    pub slug: String,
    pub counter: u32,
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let transliterated = transliterate_to_ascii(input);
    let candidate = slugify(&transliterated);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Candidate `counter` in the candidate sequence: `base`, `base-1`, `base-2`, …
pub fn slug_candidate(base: &str, counter: u32) -> String {
    if counter == 0 {
        base.to_string()
    } else {
        format!("{base}-{counter}")
    }
}

/// Walk the candidate sequence from `start` and return the first candidate the
/// predicate reports as free.
///
/// A free answer is only a hint: a concurrent writer may claim the same slug
/// before ours lands, so callers must still rely on the store's unique
/// constraint and resume probing at `counter + 1` on conflict.
pub async fn find_unique_slug<F, Fut, E>(
    base: &str,
    start: u32,
    mut is_free: F,
) -> Result<SlugCandidate, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    for counter in start..=MAX_SUFFIX_ATTEMPTS {
        let slug = slug_candidate(base, counter);
        if is_free(slug.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(SlugCandidate { slug, counter });
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted {
        base: base.to_string(),
    }))
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // slugify decides what to drop
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
