use common_types::Post;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyContent,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyContent => f.write_str("empty content"),
        }
    }
}

/// Sanitize a post in place and decide whether it may enter the pipeline.
/// Empty content is the one hard rejection; everything else is fixed up:
/// a missing author becomes "Anonymous" and negative counts clamp to zero.
/// Topic and sentiment normalisation happens at the adapter boundary via
/// the lenient enum parsers, so by this point both are always valid.
pub fn validate_post(post: &mut Post) -> Result<(), Vec<RejectReason>> {
    post.content = post.content.trim().to_string();
    post.author = post.author.trim().to_string();

    if post.content.is_empty() {
        return Err(vec![RejectReason::EmptyContent]);
    }

    if post.author.is_empty() {
        post.author = "Anonymous".to_string();
    }

    post.likes = post.likes.max(0);
    post.comments = post.comments.max(0);
    post.shares = post.shares.max(0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common_types::{Sentiment, Topic};

    fn post(content: &str, author: &str) -> Post {
        Post {
            id: "1".to_string(),
            author: author.to_string(),
            content: content.to_string(),
            topic: Topic::Programming,
            sentiment: Sentiment::Neutral,
            likes: 0,
            comments: 0,
            shares: 0,
            platform: "hackernews".to_string(),
            url: None,
            source: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn trims_whitespace() {
        let mut p = post("  hello world  ", "  alice  ");
        validate_post(&mut p).unwrap();
        assert_eq!(p.content, "hello world");
        assert_eq!(p.author, "alice");
    }

    #[test]
    fn rejects_empty_content() {
        let mut p = post("   ", "alice");
        let errs = validate_post(&mut p).unwrap_err();
        assert_eq!(errs, vec![RejectReason::EmptyContent]);
    }

    #[test]
    fn defaults_missing_author() {
        let mut p = post("hello", "   ");
        validate_post(&mut p).unwrap();
        assert_eq!(p.author, "Anonymous");
    }

    #[test]
    fn clamps_negative_counts() {
        let mut p = post("hello", "alice");
        p.likes = -3;
        p.comments = -1;
        p.shares = -7;
        validate_post(&mut p).unwrap();
        assert_eq!((p.likes, p.comments, p.shares), (0, 0, 0));
    }
}
