use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use reviewlens_common::{
    deserialize_score_map, AnalysisStatus, Grade, ProductKey, ProductRecord, ReviewLensError,
};

use super::ProductStore;

/// One row per (asin, country). Reviews, scores and artifacts are JSONB.
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, ReviewLensError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(store_err)?;
        info!("Connected to product database");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table if needed. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), ReviewLensError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS product_analyses (
                asin             TEXT              NOT NULL,
                country          TEXT              NOT NULL,
                reviews          JSONB             NOT NULL DEFAULT '[]',
                reported_total   INTEGER           NOT NULL DEFAULT 0,
                scores           JSONB             NOT NULL DEFAULT '{}',
                artifact         JSONB             NOT NULL DEFAULT '{}',
                fake_percentage  DOUBLE PRECISION  NOT NULL DEFAULT 0,
                grade            TEXT,
                amazon_rating    DOUBLE PRECISION  NOT NULL DEFAULT 0,
                adjusted_rating  DOUBLE PRECISION  NOT NULL DEFAULT 0,
                status           TEXT              NOT NULL DEFAULT 'pending',
                error_message    TEXT,
                explanation      TEXT,
                partial_note     TEXT,
                provider         TEXT,
                estimated_cost   DOUBLE PRECISION  NOT NULL DEFAULT 0,
                analyzed_at      TIMESTAMPTZ,
                updated_at       TIMESTAMPTZ       NOT NULL DEFAULT now(),
                PRIMARY KEY (asin, country)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        debug!("product_analyses table ready");
        Ok(())
    }
}

fn store_err(e: impl std::fmt::Display) -> ReviewLensError {
    ReviewLensError::Store(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<ProductRecord, ReviewLensError> {
    let key = ProductKey {
        asin: row.try_get("asin").map_err(store_err)?,
        country: row.try_get("country").map_err(store_err)?,
    };

    let reviews: Value = row.try_get("reviews").map_err(store_err)?;
    let scores: Value = row.try_get("scores").map_err(store_err)?;
    let artifact: Value = row.try_get("artifact").map_err(store_err)?;
    let reported_total: i32 = row.try_get("reported_total").map_err(store_err)?;
    let grade: Option<String> = row.try_get("grade").map_err(store_err)?;
    let status: String = row.try_get("status").map_err(store_err)?;
    let analyzed_at: Option<DateTime<Utc>> = row.try_get("analyzed_at").map_err(store_err)?;

    Ok(ProductRecord {
        reviews: serde_json::from_value(reviews).map_err(store_err)?,
        reported_total: u32::try_from(reported_total).unwrap_or(0),
        scores: deserialize_score_map(scores).map_err(store_err)?,
        artifact: serde_json::from_value(artifact).map_err(store_err)?,
        fake_percentage: row.try_get("fake_percentage").map_err(store_err)?,
        grade: grade.as_deref().and_then(Grade::parse),
        amazon_rating: row.try_get("amazon_rating").map_err(store_err)?,
        adjusted_rating: row.try_get("adjusted_rating").map_err(store_err)?,
        status: AnalysisStatus::parse(&status)
            .ok_or_else(|| store_err(format!("unknown status {status:?} for {key}")))?,
        error_message: row.try_get("error_message").map_err(store_err)?,
        explanation: row.try_get("explanation").map_err(store_err)?,
        partial_note: row.try_get("partial_note").map_err(store_err)?,
        provider: row.try_get("provider").map_err(store_err)?,
        estimated_cost: row.try_get("estimated_cost").map_err(store_err)?,
        analyzed_at,
        key,
    })
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn load(&self, key: &ProductKey) -> Result<Option<ProductRecord>, ReviewLensError> {
        let row = sqlx::query(
            "SELECT asin, country, reviews, reported_total, scores, artifact, fake_percentage,
                    grade, amazon_rating, adjusted_rating, status, error_message, explanation,
                    partial_note, provider, estimated_cost, analyzed_at
             FROM product_analyses
             WHERE asin = $1 AND country = $2",
        )
        .bind(&key.asin)
        .bind(&key.country)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save(&self, record: &ProductRecord) -> Result<(), ReviewLensError> {
        let reviews = serde_json::to_value(&record.reviews).map_err(store_err)?;
        let scores = serde_json::to_value(&record.scores).map_err(store_err)?;
        let artifact = serde_json::to_value(&record.artifact).map_err(store_err)?;
        let reported_total = i32::try_from(record.reported_total).unwrap_or(i32::MAX);

        sqlx::query(
            "INSERT INTO product_analyses (
                 asin, country, reviews, reported_total, scores, artifact, fake_percentage,
                 grade, amazon_rating, adjusted_rating, status, error_message, explanation,
                 partial_note, provider, estimated_cost, analyzed_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, now())
             ON CONFLICT (asin, country)
             DO UPDATE SET reviews = EXCLUDED.reviews,
                           reported_total = EXCLUDED.reported_total,
                           scores = EXCLUDED.scores,
                           artifact = EXCLUDED.artifact,
                           fake_percentage = EXCLUDED.fake_percentage,
                           grade = EXCLUDED.grade,
                           amazon_rating = EXCLUDED.amazon_rating,
                           adjusted_rating = EXCLUDED.adjusted_rating,
                           status = EXCLUDED.status,
                           error_message = EXCLUDED.error_message,
                           explanation = EXCLUDED.explanation,
                           partial_note = EXCLUDED.partial_note,
                           provider = EXCLUDED.provider,
                           estimated_cost = EXCLUDED.estimated_cost,
                           analyzed_at = EXCLUDED.analyzed_at,
                           updated_at = now()",
        )
        .bind(&record.key.asin)
        .bind(&record.key.country)
        .bind(reviews)
        .bind(reported_total)
        .bind(scores)
        .bind(artifact)
        .bind(record.fake_percentage)
        .bind(record.grade.map(|g| g.as_str()))
        .bind(record.amazon_rating)
        .bind(record.adjusted_rating)
        .bind(record.status.as_str())
        .bind(record.error_message.as_deref())
        .bind(record.explanation.as_deref())
        .bind(record.partial_note.as_deref())
        .bind(record.provider.as_deref())
        .bind(record.estimated_cost)
        .bind(record.analyzed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn update_status(
        &self,
        key: &ProductKey,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<(), ReviewLensError> {
        sqlx::query(
            "INSERT INTO product_analyses (asin, country, status, error_message)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (asin, country)
             DO UPDATE SET status = EXCLUDED.status,
                           error_message = EXCLUDED.error_message,
                           updated_at = now()",
        )
        .bind(&key.asin)
        .bind(&key.country)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
