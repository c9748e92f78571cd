use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_types::Post;
use sqlx::PgPool;
use thiserror::Error;

use crate::handler::BatchSink;
use crate::metrics_consts::{BATCH_ATTEMPT, BATCH_ROWS_INSERTED};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The relational store behind the consumer. One multi-row upsert per
/// batch; `ON CONFLICT (id) DO NOTHING` makes replays idempotent.
pub struct PostStore {
    pool: PgPool,
}

impl PostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The store owns its schema; id conflicts are how replayed posts get
    /// discarded, so the primary key is load-bearing.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id text PRIMARY KEY,
                author text NOT NULL,
                content text NOT NULL,
                topic text NOT NULL,
                sentiment text NOT NULL,
                likes int NOT NULL DEFAULT 0,
                comments int NOT NULL DEFAULT 0,
                shares int NOT NULL DEFAULT 0,
                platform text NOT NULL,
                created_at timestamptz NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS posts_created_at_idx ON posts (created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl BatchSink for PostStore {
    /// Single attempt, no retry: a failed batch surfaces to the caller,
    /// which logs it and moves on. The posts in it are lost to the store
    /// until their dedup keys expire, which is the accepted trade.
    async fn insert_posts(&self, posts: &[Post]) -> Result<u64, StoreError> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(posts.len());
        let mut authors = Vec::with_capacity(posts.len());
        let mut contents = Vec::with_capacity(posts.len());
        let mut topics = Vec::with_capacity(posts.len());
        let mut sentiments = Vec::with_capacity(posts.len());
        let mut likes = Vec::with_capacity(posts.len());
        let mut comments = Vec::with_capacity(posts.len());
        let mut shares = Vec::with_capacity(posts.len());
        let mut platforms = Vec::with_capacity(posts.len());
        let mut created_ats: Vec<DateTime<Utc>> = Vec::with_capacity(posts.len());

        for post in posts {
            ids.push(post.id.clone());
            authors.push(post.author.clone());
            contents.push(post.content.clone());
            topics.push(post.topic.to_string());
            sentiments.push(post.sentiment.to_string());
            likes.push(post.likes);
            comments.push(post.comments);
            shares.push(post.shares);
            platforms.push(post.platform.clone());
            created_ats.push(post.created_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO posts (id, author, content, topic, sentiment,
                               likes, comments, shares, platform, created_at)
            SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[],
                                 $6::int[], $7::int[], $8::int[], $9::text[], $10::timestamptz[])
            ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&ids)
        .bind(&authors)
        .bind(&contents)
        .bind(&topics)
        .bind(&sentiments)
        .bind(&likes)
        .bind(&comments)
        .bind(&shares)
        .bind(&platforms)
        .bind(&created_ats)
        .execute(&self.pool)
        .await;

        match result {
            Ok(pg_result) => {
                let rows = pg_result.rows_affected();
                metrics::counter!(BATCH_ATTEMPT, &[("result", "success")]).increment(1);
                common_metrics::inc(BATCH_ROWS_INSERTED, &[], rows);
                Ok(rows)
            }
            Err(e) => {
                metrics::counter!(BATCH_ATTEMPT, &[("result", "failed")]).increment(1);
                Err(StoreError::Database(e))
            }
        }
    }
}
