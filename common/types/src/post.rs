use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The topic buckets every post is classified into. Upstream labels are
/// free-form, so parsing is lenient: anything unmapped falls back to
/// `Programming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Ai,
    Cloud,
    Devops,
    Programming,
    Startup,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Ai,
        Topic::Cloud,
        Topic::Devops,
        Topic::Programming,
        Topic::Startup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Ai => "ai",
            Topic::Cloud => "cloud",
            Topic::Devops => "devops",
            Topic::Programming => "programming",
            Topic::Startup => "startup",
        }
    }

    /// Lowercases and trims the label, defaulting to `Programming` for
    /// anything that isn't one of the known topics.
    pub fn from_label(label: &str) -> Topic {
        match label.trim().to_lowercase().as_str() {
            "ai" => Topic::Ai,
            "cloud" => Topic::Cloud,
            "devops" => Topic::Devops,
            "startup" => Topic::Startup,
            _ => Topic::Programming,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    pub fn from_label(label: &str) -> Sentiment {
        match label.trim().to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical post record flowing crawler → bus → consumer → store. The
/// JSON encoding of this struct is the wire format on the bus; the field
/// names are load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub content: String,
    pub topic: Topic,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub likes: i32,
    #[serde(default)]
    pub comments: i32,
    #[serde(default)]
    pub shares: i32,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Cross-source dedup key: the same article posted under different ids
    /// on different platforms still hashes identically.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hasher.update(b"|");
        hasher.update(self.author.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// likes + 2·comments + 3·shares, the weighting used by the trending
    /// scorer.
    pub fn engagement(&self) -> i64 {
        self.likes as i64 + 2 * self.comments as i64 + 3 * self.shares as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> Post {
        Post {
            id: "42".to_string(),
            author: "alice".to_string(),
            content: "Introducing a faster hash table".to_string(),
            topic: Topic::Programming,
            sentiment: Sentiment::Neutral,
            likes: 10,
            comments: 2,
            shares: 1,
            platform: "hackernews".to_string(),
            url: None,
            source: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn wire_format_keys() {
        let value = serde_json::to_value(sample_post()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "id",
            "author",
            "content",
            "topic",
            "sentiment",
            "likes",
            "comments",
            "shares",
            "platform",
            "created_at",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
        // Optional fields stay off the wire when unset
        assert!(!obj.contains_key("url"));
        assert!(!obj.contains_key("source"));
        assert_eq!(obj["topic"], "programming");
        assert_eq!(obj["sentiment"], "neutral");
    }

    #[test]
    fn round_trips_through_json() {
        let post = sample_post();
        let encoded = serde_json::to_string(&post).unwrap();
        let decoded: Post = serde_json::from_str(&encoded).unwrap();
        assert_eq!(post, decoded);
    }

    #[test]
    fn topic_label_parsing_is_lenient() {
        assert_eq!(Topic::from_label("AI"), Topic::Ai);
        assert_eq!(Topic::from_label("  DevOps "), Topic::Devops);
        assert_eq!(Topic::from_label("blockchain"), Topic::Programming);
        assert_eq!(Topic::from_label(""), Topic::Programming);
    }

    #[test]
    fn sentiment_defaults_to_neutral() {
        assert_eq!(Sentiment::from_label("POSITIVE"), Sentiment::Positive);
        assert_eq!(Sentiment::from_label("meh"), Sentiment::Neutral);
        assert_eq!(Sentiment::default(), Sentiment::Neutral);
    }

    #[test]
    fn content_hash_ignores_id_and_platform() {
        let a = sample_post();
        let mut b = sample_post();
        b.id = "other-id".to_string();
        b.platform = "medium".to_string();
        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = sample_post();
        c.author = "bob".to_string();
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn engagement_weighting() {
        let post = sample_post();
        assert_eq!(post.engagement(), 10 + 2 * 2 + 3);
    }
}
