use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use common_types::{Post, Topic};
use serde::Serialize;

/// A topic needs more than this many mentions in the window to trend.
const TRENDING_THRESHOLD: usize = 5;
const TRENDING_CONFIDENCE: f64 = 0.8;
/// A post is anomalous when its likes exceed three times the window mean.
const ANOMALY_MULTIPLIER: i64 = 3;
const ANOMALY_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Simple pattern detection over a bounded rolling window of posts.
pub struct InsightEngine {
    window: Duration,
    posts: Vec<Post>,
}

impl InsightEngine {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            posts: Vec::new(),
        }
    }

    pub fn add_posts(&mut self, posts: impl IntoIterator<Item = Post>, now: DateTime<Utc>) {
        self.posts.extend(posts);
        let cutoff = now - self.window;
        self.posts.retain(|post| post.created_at > cutoff);
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Topics mentioned more than the threshold, in topic order for stable
    /// output.
    pub fn detect_trending(&self, now: DateTime<Utc>) -> Vec<Insight> {
        let mut counts: HashMap<Topic, usize> = HashMap::new();
        for post in &self.posts {
            *counts.entry(post.topic).or_insert(0) += 1;
        }

        let hours = self.window.num_hours();
        Topic::ALL
            .iter()
            .filter_map(|topic| {
                let count = counts.get(topic).copied().unwrap_or(0);
                (count > TRENDING_THRESHOLD).then(|| Insight {
                    kind: "trending",
                    title: format!("{topic} is trending"),
                    description: format!("{count} mentions in last {hours}h"),
                    confidence: TRENDING_CONFIDENCE,
                    timestamp: now,
                })
            })
            .collect()
    }

    /// Posts whose likes blow past three times the window mean. The mean is
    /// an integer division, so the threshold moves in whole likes.
    pub fn detect_anomalies(&self, now: DateTime<Utc>) -> Vec<Insight> {
        if self.posts.is_empty() {
            return Vec::new();
        }

        let total_likes: i64 = self.posts.iter().map(|p| p.likes as i64).sum();
        let avg_likes = total_likes / self.posts.len() as i64;
        let threshold = avg_likes * ANOMALY_MULTIPLIER;

        self.posts
            .iter()
            .filter(|post| (post.likes as i64) > threshold)
            .map(|post| Insight {
                kind: "anomaly",
                title: "Viral post detected".to_string(),
                description: format!("Post with {} likes (avg: {avg_likes})", post.likes),
                confidence: ANOMALY_CONFIDENCE,
                timestamp: now,
            })
            .collect()
    }

    pub fn all_insights(&self, now: DateTime<Utc>) -> Vec<Insight> {
        let mut insights = self.detect_trending(now);
        insights.extend(self.detect_anomalies(now));
        insights
    }
}
