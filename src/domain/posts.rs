//! Post field rules: validation bounds and the derived-field formulas.

use url::Url;

use super::error::DomainError;

pub const WORDS_PER_MINUTE: usize = 200;
/// Word-count change above which an edit is worth re-summarizing.
pub const SUMMARY_WORD_DELTA_THRESHOLD: usize = 50;
pub const EXCERPT_MAX_CHARS: usize = 200;
pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const CONTENT_MIN_CHARS: usize = 10;
pub const TAG_MAX_CHARS: usize = 20;
pub const COMMENT_MAX_CHARS: usize = 1000;

/// Whitespace-delimited word count.
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Minutes of reading time: `ceil(word_count / 200)`.
pub fn reading_time(content: &str) -> u32 {
    let minutes = word_count(content).div_ceil(WORDS_PER_MINUTE);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

pub fn word_delta(previous: &str, next: &str) -> usize {
    word_count(previous).abs_diff(word_count(next))
}

/// Trim and cut summarizer output to the excerpt bound on a char boundary.
pub fn truncate_excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(EXCERPT_MAX_CHARS) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

pub fn validate_title(title: &str) -> Result<String, DomainError> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if len < TITLE_MIN_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("must be at least {TITLE_MIN_CHARS} characters"),
        ));
    }
    if len > TITLE_MAX_CHARS {
        return Err(DomainError::validation(
            "title",
            format!("cannot exceed {TITLE_MAX_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Length is measured after trimming, so accepted content always holds a word.
pub fn validate_content(content: &str) -> Result<(), DomainError> {
    if content.trim().chars().count() < CONTENT_MIN_CHARS {
        return Err(DomainError::validation(
            "content",
            format!("must be at least {CONTENT_MIN_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Trim, validate, and de-duplicate tags while keeping their order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, DomainError> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().count() > TAG_MAX_CHARS {
            return Err(DomainError::validation(
                "tags",
                format!("tags must be 1 to {TAG_MAX_CHARS} characters"),
            ));
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DomainError::validation(
                "tags",
                "tags can only contain letters, numbers, and hyphens",
            ));
        }
        if !normalized.iter().any(|existing| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    Ok(normalized)
}

pub fn validate_featured_image(raw: &str) -> Result<String, DomainError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|err| DomainError::validation("featured_image", err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(DomainError::validation(
            "featured_image",
            "must be an http(s) URL",
        ));
    }
    Ok(parsed.to_string())
}

pub fn validate_excerpt(excerpt: &str) -> Result<String, DomainError> {
    let trimmed = excerpt.trim();
    if trimmed.chars().count() > EXCERPT_MAX_CHARS {
        return Err(DomainError::validation(
            "excerpt",
            format!("cannot exceed {EXCERPT_MAX_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_comment(content: &str) -> Result<String, DomainError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("comment", "cannot be empty"));
    }
    if trimmed.chars().count() > COMMENT_MAX_CHARS {
        return Err(DomainError::validation("comment", "is too long"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn reading_time_rounds_up() {
        assert_eq!(reading_time(""), 0);
        assert_eq!(reading_time(&words(1)), 1);
        assert_eq!(reading_time(&words(200)), 1);
        assert_eq!(reading_time(&words(201)), 2);
        assert_eq!(reading_time(&words(1000)), 5);
    }

    #[test]
    fn word_count_collapses_runs_of_whitespace() {
        assert_eq!(word_count("  one\ttwo\n\nthree   "), 3);
    }

    #[test]
    fn word_delta_is_symmetric() {
        assert_eq!(word_delta(&words(10), &words(80)), 70);
        assert_eq!(word_delta(&words(90), &words(80)), 10);
    }

    #[test]
    fn truncate_excerpt_respects_char_boundaries() {
        let long = "é".repeat(250);
        let cut = truncate_excerpt(&long);
        assert_eq!(cut.chars().count(), EXCERPT_MAX_CHARS);
        assert_eq!(truncate_excerpt("  short  "), "short");
    }

    #[test]
    fn tags_are_deduplicated_and_checked() {
        let tags = vec!["rust".to_string(), " rust ".to_string(), "web-dev".to_string()];
        assert_eq!(
            normalize_tags(&tags).expect("tags"),
            vec!["rust".to_string(), "web-dev".to_string()]
        );
        assert!(normalize_tags(&["no spaces".to_string()]).is_err());
        assert!(normalize_tags(&["x".repeat(21)]).is_err());
    }

    #[test]
    fn featured_image_requires_http_scheme() {
        assert!(validate_featured_image("https://cdn.example.com/a.png").is_ok());
        assert!(validate_featured_image("ftp://cdn.example.com/a.png").is_err());
        assert!(validate_featured_image("not a url").is_err());
    }

    #[test]
    fn title_bounds_apply_after_trim() {
        assert_eq!(validate_title("  Hello  ").expect("title"), "Hello");
        assert!(validate_title("  a ").is_err());
        assert!(validate_title(&"t".repeat(101)).is_err());
    }

    #[test]
    fn blank_content_is_rejected() {
        assert!(validate_content(&" ".repeat(12)).is_err());
        assert!(validate_content("  \n\t  short  \n ").is_err());

        let body = "  ten chars!  ";
        assert!(validate_content(body).is_ok());
        assert_eq!(reading_time(body), 1);
    }

    #[test]
    fn comment_bounds() {
        assert!(validate_comment("   ").is_err());
        assert!(validate_comment(&"c".repeat(1001)).is_err());
        assert_eq!(validate_comment(" nice post ").expect("comment"), "nice post");
    }
}
