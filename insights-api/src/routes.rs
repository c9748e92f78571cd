use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use common_cache::{sentiment_counter_key, topic_counter_key, FeedCache, TOTAL_COUNTER_KEY};
use common_types::{Post, Sentiment, Topic};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::insights::{Insight, InsightEngine};
use crate::queries::{AuthorStats, PostQueries};
use crate::scoring::{ScoredPost, TrendingScorer};

const RECENT_VIEW_LIMIT: i64 = 20;
const TOP_AUTHORS_LIMIT: i64 = 10;
const TRENDING_VIEW_LIMIT: usize = 10;
/// Sources shown on the crawler status view.
const SOURCES: [&str; 3] = ["hn", "medium", "devto"];

#[derive(Clone)]
pub struct AppState {
    pub cache: FeedCache,
    pub queries: Arc<PostQueries>,
    /// Detection window for `/api/insights`.
    pub insights_window: Duration,
    /// Scoring window for `/api/trending`.
    pub trending_window: Duration,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/topics", get(topics))
        .route("/api/sentiment", get(sentiment))
        .route("/api/authors", get(authors))
        .route("/api/recent", get(recent))
        .route("/api/crawlers", get(crawlers))
        .route("/api/insights", get(insights))
        .route("/api/compare", get(compare))
        .route("/api/trending", get(trending))
        .layer(cors)
        .with_state(state)
}

/// Plumb any internal error out as a 500; the JSON surface has no partial
/// failure modes worth distinguishing for a dashboard.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("api error: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    time: DateTime<Utc>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now(),
    })
}

#[derive(Serialize)]
struct StatsResponse {
    total_posts: i64,
    by_topic: HashMap<String, i64>,
    by_sentiment: HashMap<String, i64>,
}

/// Cache first; when the counters are cold (or the cache is down) the
/// store answers instead.
async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let cached = state.cache.stats().await.unwrap_or_default();
    let total = cached.get(TOTAL_COUNTER_KEY).copied().unwrap_or(0);

    if total > 0 {
        let by_topic = Topic::ALL
            .iter()
            .map(|t| {
                let count = cached.get(&topic_counter_key(*t)).copied().unwrap_or(0);
                (t.to_string(), count)
            })
            .collect();
        let by_sentiment = Sentiment::ALL
            .iter()
            .map(|s| {
                let count = cached.get(&sentiment_counter_key(*s)).copied().unwrap_or(0);
                (s.to_string(), count)
            })
            .collect();
        return Ok(Json(StatsResponse {
            total_posts: total,
            by_topic,
            by_sentiment,
        }));
    }

    let total_posts = state.queries.post_count().await?;

    let mut by_topic: HashMap<String, i64> =
        Topic::ALL.iter().map(|t| (t.to_string(), 0)).collect();
    for (topic, count) in state.queries.counts_by_topic().await? {
        by_topic.insert(topic, count);
    }

    let mut by_sentiment: HashMap<String, i64> =
        Sentiment::ALL.iter().map(|s| (s.to_string(), 0)).collect();
    for (sentiment, count) in state.queries.counts_by_sentiment().await? {
        by_sentiment.insert(sentiment, count);
    }

    Ok(Json(StatsResponse {
        total_posts,
        by_topic,
        by_sentiment,
    }))
}

async fn topics(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, i64>>, ApiError> {
    Ok(Json(state.queries.counts_by_topic().await?.into_iter().collect()))
}

async fn sentiment(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, i64>>, ApiError> {
    Ok(Json(
        state.queries.counts_by_sentiment().await?.into_iter().collect(),
    ))
}

async fn authors(State(state): State<AppState>) -> Result<Json<Vec<AuthorStats>>, ApiError> {
    Ok(Json(state.queries.top_authors(TOP_AUTHORS_LIMIT).await?))
}

async fn recent(State(state): State<AppState>) -> Result<Json<Vec<Post>>, ApiError> {
    match state.cache.recent_posts(RECENT_VIEW_LIMIT).await {
        Ok(posts) if !posts.is_empty() => Ok(Json(posts)),
        Ok(_) => Ok(Json(state.queries.recent_posts(RECENT_VIEW_LIMIT).await?)),
        Err(e) => {
            warn!("recent posts cache read failed, using store: {e}");
            Ok(Json(state.queries.recent_posts(RECENT_VIEW_LIMIT).await?))
        }
    }
}

async fn crawlers(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    let mut result = HashMap::with_capacity(SOURCES.len());
    for source in SOURCES {
        let status = match state.cache.last_crawl(source).await {
            Ok(Some(at)) => at.to_rfc3339(),
            Ok(None) => "never".to_string(),
            Err(_) => "unknown".to_string(),
        };
        result.insert(source.to_string(), status);
    }
    Ok(Json(result))
}

#[derive(Serialize)]
struct InsightsResponse {
    insights: Vec<Insight>,
    total: usize,
    /// The posts driving the window, ranked by the full trending score.
    top_posts: Vec<ScoredPost>,
}

const INSIGHT_TOP_POSTS: usize = 5;

async fn insights(State(state): State<AppState>) -> Result<Json<InsightsResponse>, ApiError> {
    let now = Utc::now();
    let posts = state.queries.posts_since(now - state.insights_window).await?;

    let mut engine = InsightEngine::new(state.insights_window);
    engine.add_posts(posts.clone(), now);
    let insights = engine.all_insights(now);

    let avg_engagement = if posts.is_empty() {
        0
    } else {
        (posts.iter().map(|p| p.engagement()).sum::<i64>() / posts.len() as i64).max(1)
    };
    let mut scorer = TrendingScorer::new(state.insights_window, avg_engagement);
    scorer.add_posts(posts, now);
    let top_posts = scorer.trending(INSIGHT_TOP_POSTS, now);

    Ok(Json(InsightsResponse {
        total: insights.len(),
        insights,
        top_posts,
    }))
}

#[derive(Serialize)]
struct CompareSide {
    posts: i64,
    engagement: i64,
}

#[derive(Serialize)]
struct CompareDelta {
    posts_change: i64,
    posts_percent: f64,
    engagement_change: i64,
}

#[derive(Serialize)]
struct CompareResponse {
    today: CompareSide,
    yesterday: CompareSide,
    comparison: CompareDelta,
}

async fn compare(State(state): State<AppState>) -> Result<Json<CompareResponse>, ApiError> {
    let now = Utc::now();
    let today_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let yesterday_start = today_start - Duration::days(1);

    let today_posts = state.queries.posts_in_range(today_start, now).await?;
    let yesterday_posts = state
        .queries
        .posts_in_range(yesterday_start, today_start)
        .await?;

    let today = CompareSide {
        posts: today_posts.len() as i64,
        engagement: raw_engagement_sum(&today_posts),
    };
    let yesterday = CompareSide {
        posts: yesterday_posts.len() as i64,
        engagement: raw_engagement_sum(&yesterday_posts),
    };

    let comparison = CompareDelta {
        posts_change: today.posts - yesterday.posts,
        posts_percent: percent_change(today.posts, yesterday.posts),
        engagement_change: today.engagement - yesterday.engagement,
    };

    Ok(Json(CompareResponse {
        today,
        yesterday,
        comparison,
    }))
}

#[derive(Serialize)]
struct TrendingItem {
    post: Post,
    score: f64,
    rank: usize,
}

#[derive(Serialize)]
struct TrendingResponse {
    trending: Vec<TrendingItem>,
    total: usize,
}

/// The `/api/trending` view deliberately uses a simpler score than the
/// full scorer in `scoring.rs`: `0.4·recency + 0.6·min(engagement/avg, 2)`
/// with no virality term.
async fn trending(State(state): State<AppState>) -> Result<Json<TrendingResponse>, ApiError> {
    let now = Utc::now();
    let posts = state.queries.posts_since(now - state.trending_window).await?;

    if posts.is_empty() {
        return Ok(Json(TrendingResponse {
            trending: Vec::new(),
            total: 0,
        }));
    }

    let avg_engagement = (raw_engagement_sum(&posts) / posts.len() as i64).max(1);

    let mut items: Vec<TrendingItem> = posts
        .into_iter()
        .map(|post| {
            let score = trending_view_score(&post, avg_engagement, now);
            TrendingItem {
                post,
                score,
                rank: 0,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(TRENDING_VIEW_LIMIT);
    for (i, item) in items.iter_mut().enumerate() {
        item.rank = i + 1;
    }

    Ok(Json(TrendingResponse {
        total: items.len(),
        trending: items,
    }))
}

/// Unweighted engagement, the sum the comparison and averaging views use.
fn raw_engagement_sum(posts: &[Post]) -> i64 {
    posts
        .iter()
        .map(|p| p.likes as i64 + p.comments as i64 + p.shares as i64)
        .sum()
}

/// Day-over-day percent change: a day that springs from zero reads as
/// +100%, and two empty days read as 0.
fn percent_change(today: i64, yesterday: i64) -> f64 {
    if yesterday > 0 {
        (today - yesterday) as f64 / yesterday as f64 * 100.0
    } else if today > 0 {
        100.0
    } else {
        0.0
    }
}

fn trending_view_score(post: &Post, avg_engagement: i64, now: DateTime<Utc>) -> f64 {
    let hours = (now - post.created_at).num_seconds() as f64 / 3600.0;
    let recency = 1.0 / (1.0 + hours / 24.0);

    let engagement_norm = (post.engagement() as f64 / avg_engagement as f64).min(2.0);

    0.4 * recency + 0.6 * engagement_norm
}
