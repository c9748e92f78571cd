use chrono::{DateTime, Utc};
use common_types::{Post, Sentiment, Topic};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone, Serialize)]
pub struct AuthorStats {
    pub author: String,
    pub post_count: i64,
    pub total_likes: i64,
}

/// Read side of the posts table. The cache serves the hot views; these
/// queries are the authoritative fallback and the source for the windowed
/// analytics.
pub struct PostQueries {
    pool: PgPool,
}

impl PostQueries {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn post_count(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM posts")
            .fetch_one(&self.pool)
            .await?;
        row.try_get("count")
    }

    pub async fn counts_by_topic(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query("SELECT topic, COUNT(*) AS count FROM posts GROUP BY topic")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("topic")?,
                    row.try_get::<i64, _>("count")?,
                ))
            })
            .collect()
    }

    pub async fn counts_by_sentiment(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query("SELECT sentiment, COUNT(*) AS count FROM posts GROUP BY sentiment")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("sentiment")?,
                    row.try_get::<i64, _>("count")?,
                ))
            })
            .collect()
    }

    /// Most prolific authors; equal post counts are broken by total likes.
    pub async fn top_authors(&self, limit: i64) -> Result<Vec<AuthorStats>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT author, COUNT(*) AS post_count, COALESCE(SUM(likes), 0)::bigint AS total_likes
            FROM posts
            GROUP BY author
            ORDER BY post_count DESC, total_likes DESC
            LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AuthorStats {
                    author: row.try_get("author")?,
                    post_count: row.try_get("post_count")?,
                    total_likes: row.try_get("total_likes")?,
                })
            })
            .collect()
    }

    pub async fn posts_since(&self, since: DateTime<Utc>) -> Result<Vec<Post>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM posts WHERE created_at >= $1 ORDER BY created_at DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(post_from_row).collect()
    }

    pub async fn posts_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Post>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM posts WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at DESC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(post_from_row).collect()
    }

    /// Newest posts straight from the store, for when the cache is cold.
    pub async fn recent_posts(&self, limit: i64) -> Result<Vec<Post>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM posts ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(post_from_row).collect()
    }
}

fn post_from_row(row: &PgRow) -> Result<Post, sqlx::Error> {
    let topic: String = row.try_get("topic")?;
    let sentiment: String = row.try_get("sentiment")?;
    Ok(Post {
        id: row.try_get("id")?,
        author: row.try_get("author")?,
        content: row.try_get("content")?,
        topic: Topic::from_label(&topic),
        sentiment: Sentiment::from_label(&sentiment),
        likes: row.try_get("likes")?,
        comments: row.try_get("comments")?,
        shares: row.try_get("shares")?,
        platform: row.try_get("platform")?,
        url: None,
        source: None,
        created_at: row.try_get("created_at")?,
    })
}
