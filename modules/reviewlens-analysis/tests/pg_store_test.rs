//! Integration tests for PgProductStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{Timelike, Utc};
use serde_json::json;
use sqlx::PgPool;

use reviewlens_analysis::store::{PgProductStore, ProductStore};
use reviewlens_analysis::testing::review_set;
use reviewlens_common::{
    AnalysisStatus, Assessment, Grade, ProductKey, ProductRecord, ReviewScore, ScoreLabel,
};

/// Get a migrated store, or skip if no test DB is available.
async fn test_store() -> Option<PgProductStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgProductStore::new(pool);
    store.migrate().await.ok()?;
    Some(store)
}

/// Each test works on its own product so tests can share one database.
async fn clean_key(store: &PgProductStore, asin: &str) -> ProductKey {
    let key = ProductKey::new(asin, "us");
    sqlx::query("DELETE FROM product_analyses WHERE asin = $1 AND country = $2")
        .bind(&key.asin)
        .bind(&key.country)
        .execute(store.pool())
        .await
        .unwrap();
    key
}

fn completed_record(key: ProductKey) -> ProductRecord {
    let reviews = review_set(3);
    let scores = reviews
        .iter()
        .map(|r| {
            (
                r.id.clone(),
                ReviewScore::Assessed(Assessment {
                    review_id: r.id.clone(),
                    score: 30,
                    label: ScoreLabel::Genuine,
                    confidence: 0.75,
                    explanation: "ordinary detail".into(),
                    red_flags: vec![],
                }),
            )
        })
        .collect();

    ProductRecord {
        reviews,
        reported_total: 3,
        scores,
        fake_percentage: 0.0,
        grade: Some(Grade::A),
        amazon_rating: 2.0,
        adjusted_rating: 2.0,
        status: AnalysisStatus::Completed,
        explanation: Some("Analyzed 3 reviews".into()),
        provider: Some("anthropic".into()),
        estimated_cost: 0.0021,
        // Postgres keeps microseconds.
        analyzed_at: Some(Utc::now().with_nanosecond(0).unwrap()),
        ..ProductRecord::new(key)
    }
}

// =========================================================================
// Round trips
// =========================================================================

#[tokio::test]
async fn save_then_load_returns_same_record() {
    let Some(store) = test_store().await else {
        return;
    };
    let key = clean_key(&store, "B0PGSAVE").await;
    let record = completed_record(key.clone());

    store.save(&record).await.unwrap();
    let loaded = store.load(&key).await.unwrap().unwrap();

    assert_eq!(loaded, record);
}

#[tokio::test]
async fn load_missing_product_is_none() {
    let Some(store) = test_store().await else {
        return;
    };
    let key = clean_key(&store, "B0PGNONE").await;
    assert!(store.load(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn update_status_keeps_existing_scores() {
    let Some(store) = test_store().await else {
        return;
    };
    let key = clean_key(&store, "B0PGSTAT").await;
    store.save(&completed_record(key.clone())).await.unwrap();

    store
        .update_status(&key, AnalysisStatus::Analyzing, None)
        .await
        .unwrap();

    let loaded = store.load(&key).await.unwrap().unwrap();
    assert_eq!(loaded.status, AnalysisStatus::Analyzing);
    assert_eq!(loaded.scores.len(), 3);
    assert_eq!(loaded.grade, Some(Grade::A));
}

#[tokio::test]
async fn failed_status_on_new_product_has_no_scores() {
    let Some(store) = test_store().await else {
        return;
    };
    let key = clean_key(&store, "B0PGFAIL").await;

    store
        .update_status(&key, AnalysisStatus::Failed, Some("provider down"))
        .await
        .unwrap();

    let loaded = store.load(&key).await.unwrap().unwrap();
    assert_eq!(loaded.status, AnalysisStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("provider down"));
    assert!(loaded.scores.is_empty());
    assert!(loaded.grade.is_none());
}

#[tokio::test]
async fn bare_number_scores_load_as_legacy() {
    let Some(store) = test_store().await else {
        return;
    };
    let key = clean_key(&store, "B0PGOLD").await;

    sqlx::query(
        "INSERT INTO product_analyses (asin, country, scores, status)
         VALUES ($1, $2, $3, 'completed')",
    )
    .bind(&key.asin)
    .bind(&key.country)
    .bind(json!({ "r0": 92, "r1": 14.6 }))
    .execute(store.pool())
    .await
    .unwrap();

    let loaded = store.load(&key).await.unwrap().unwrap();
    assert!(loaded.scores.values().all(|s| s.is_legacy()));
    assert_eq!(loaded.scores["r0"].score(), 92);
    assert_eq!(loaded.scores["r1"].score(), 15);
}
