use chrono::{DateTime, Duration, Utc};
use common_types::Post;
use serde::Serialize;

/// Trending score weights: recency dominates, engagement second, a flat
/// virality bonus for clear outliers.
const RECENCY_WEIGHT: f64 = 0.5;
const ENGAGEMENT_WEIGHT: f64 = 0.3;
const VIRALITY_WEIGHT: f64 = 0.2;
const VIRALITY_BONUS: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPost {
    pub post: Post,
    pub score: f64,
    pub rank: usize,
}

/// Time-decayed engagement scoring over a bounded rolling window. `now` is
/// always an explicit argument, which keeps scores deterministic for a
/// fixed clock and average.
pub struct TrendingScorer {
    window: Duration,
    avg_engagement: i64,
    posts: Vec<Post>,
}

impl TrendingScorer {
    pub fn new(window: Duration, avg_engagement: i64) -> Self {
        Self {
            window,
            avg_engagement,
            posts: Vec::new(),
        }
    }

    /// Add posts, dropping everything that has aged out of the window.
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

    /// score = 0.5·recency + 0.3·min(engagement/avg, 1) + 0.2·virality,
    /// where recency decays over 24h and virality pays a flat 0.5 bonus for
    /// engagement above twice the average.
    pub fn score(&self, post: &Post, now: DateTime<Utc>) -> f64 {
        let hours = (now - post.created_at).num_seconds() as f64 / 3600.0;
        let recency = 1.0 / (1.0 + hours / 24.0);

        let engagement = post.engagement();
        let engagement_norm = if self.avg_engagement > 0 {
            (engagement as f64 / self.avg_engagement as f64).min(1.0)
        } else {
            0.0
        };

        let virality = if engagement > 2 * self.avg_engagement {
            VIRALITY_BONUS
        } else {
            0.0
        };

        RECENCY_WEIGHT * recency + ENGAGEMENT_WEIGHT * engagement_norm + VIRALITY_WEIGHT * virality
    }

    /// Top `limit` posts by score, ranked from 1. The sort is stable, so
    /// equal scores keep their insertion order.
    pub fn trending(&self, limit: usize, now: DateTime<Utc>) -> Vec<ScoredPost> {
        let mut scored: Vec<ScoredPost> = self
            .posts
            .iter()
            .map(|post| ScoredPost {
                post: post.clone(),
                score: self.score(post, now),
                rank: 0,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scored.truncate(limit);
        for (i, entry) in scored.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common_types::{Sentiment, Topic};

    fn post(id: &str, likes: i32, created_at: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            author: "a".to_string(),
            content: format!("content {id}"),
            topic: Topic::Ai,
            sentiment: Sentiment::Neutral,
            likes,
            comments: 0,
            shares: 0,
            platform: "hackernews".to_string(),
            url: None,
            source: None,
            created_at,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn score_is_deterministic_for_fixed_clock() {
        let scorer = TrendingScorer::new(Duration::hours(24), 10);
        let p = post("1", 8, fixed_now() - Duration::hours(6));
        let a = scorer.score(&p, fixed_now());
        let b = scorer.score(&p, fixed_now());
        assert_eq!(a, b);
    }

    #[test]
    fn score_weights_add_up() {
        let scorer = TrendingScorer::new(Duration::hours(24), 10);
        let now = fixed_now();

        // Brand new, average engagement, no virality:
        // 0.5·1 + 0.3·1 + 0 = 0.8
        let p = post("1", 10, now);
        assert!((scorer.score(&p, now) - 0.8).abs() < 1e-9);

        // Brand new, no engagement: only recency counts
        let p = post("2", 0, now);
        assert!((scorer.score(&p, now) - 0.5).abs() < 1e-9);

        // 24h old: recency halves
        let p = post("3", 0, now - Duration::hours(24));
        assert!((scorer.score(&p, now) - 0.25).abs() < 1e-9);

        // Viral post: engagement capped at 1, bonus paid
        // 0.5·1 + 0.3·1 + 0.2·0.5 = 0.9
        let p = post("4", 25, now);
        assert!((scorer.score(&p, now) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn virality_needs_strictly_more_than_double_average() {
        let scorer = TrendingScorer::new(Duration::hours(24), 10);
        let now = fixed_now();
        let at_double = post("1", 20, now);
        let above_double = post("2", 21, now);
        assert!(scorer.score(&above_double, now) > scorer.score(&at_double, now) + 0.09);
    }

    #[test]
    fn zero_average_engagement_scores_on_recency_alone() {
        let scorer = TrendingScorer::new(Duration::hours(24), 0);
        let now = fixed_now();
        let p = post("1", 1000, now);
        assert!((scorer.score(&p, now) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn window_drops_old_posts() {
        let mut scorer = TrendingScorer::new(Duration::hours(24), 10);
        let now = fixed_now();
        scorer.add_posts(
            vec![
                post("fresh", 1, now - Duration::hours(1)),
                post("stale", 1, now - Duration::hours(25)),
            ],
            now,
        );
        assert_eq!(scorer.len(), 1);
    }

    #[test]
    fn trending_ranks_stably() {
        let mut scorer = TrendingScorer::new(Duration::hours(24), 10);
        let now = fixed_now();
        let at = now - Duration::hours(2);
        // Identical scores: insertion order must hold
        scorer.add_posts(
            vec![post("first", 5, at), post("second", 5, at), post("third", 5, at)],
            now,
        );

        let ranked = scorer.trending(10, now);
        let ids: Vec<_> = ranked.iter().map(|s| s.post.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        let ranks: Vec<_> = ranked.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn trending_orders_by_score_and_truncates() {
        let mut scorer = TrendingScorer::new(Duration::hours(48), 10);
        let now = fixed_now();
        scorer.add_posts(
            vec![
                post("old_quiet", 0, now - Duration::hours(40)),
                post("new_loud", 30, now),
                post("new_quiet", 0, now),
            ],
            now,
        );

        let ranked = scorer.trending(2, now);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].post.id, "new_loud");
        assert_eq!(ranked[1].post.id, "new_quiet");
    }
}
