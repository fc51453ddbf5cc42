use std::sync::Arc;
use std::time::Duration as StdDuration;

use scrape_core::{ArticleStatus, JobStatus, Publisher, Queue, Store, Submitter};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::task::JoinSet;

mod common;
use common::{context, AlwaysFails, AlwaysSucceeds};

async fn submit_one(db: &PgPool, url: &str) -> (String, uuid::Uuid) {
    let store = Store::from_pool(db.clone());
    let queue = Queue::new(db.clone());
    let publisher = Publisher::new(db.clone());
    let submitter = Submitter::new(&store, &queue, &publisher);

    let job = submitter
        .submit(vec![scrape_core::ArticleRequest {
            url: url.to_string(),
            source: None,
            category: None,
            priority: 5,
        }])
        .await
        .expect("submit");

    (job.id, job.article_ids[0])
}

#[sqlx::test(migrations = "../core/migrations")]
async fn tick_scrapes_a_fresh_item_to_completion(db: PgPool) {
    let (job_id, article_id) = submit_one(&db, "https://news.example/one").await;

    let context = context(db.clone(), Arc::new(AlwaysSucceeds), 3).await;
    let mut tasks = JoinSet::new();
    let started = scrape_worker::engine::tick(context.clone(), &mut tasks)
        .await
        .expect("tick");
    assert_eq!(started, 1);
    while tasks.join_next().await.is_some() {}

    let store = Store::from_pool(db.clone());
    let article = store.get_article(article_id).await.expect("get article");
    assert_eq!(article.status, ArticleStatus::Scraped);
    assert_eq!(article.title.as_deref(), Some("stub title"));

    let job = store.get_job(&job_id).await.expect("get job");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_count, 1);
    assert_eq!(job.failed_count, 0);
}

#[sqlx::test(migrations = "../core/migrations")]
async fn retries_exhaust_into_failed_after_max_attempts(db: PgPool) {
    let (job_id, article_id) = submit_one(&db, "https://news.example/flaky").await;

    // max_retry_attempts = 2: first failure retries, second exhausts.
    let context = context(db.clone(), Arc::new(AlwaysFails), 2).await;
    let store = Store::from_pool(db.clone());

    let mut tasks = JoinSet::new();
    let started = scrape_worker::engine::tick(context.clone(), &mut tasks)
        .await
        .expect("first tick");
    assert_eq!(started, 1);
    while tasks.join_next().await.is_some() {}

    let article = store.get_article(article_id).await.expect("get article");
    assert_eq!(article.status, ArticleStatus::Pending);
    assert_eq!(article.retry_count, 1);

    // The retry's re-enqueue happens on its own delayed task; give it time
    // to land before popping again (backoff is configured at 1ms in tests).
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    let mut tasks = JoinSet::new();
    let started = scrape_worker::engine::tick(context.clone(), &mut tasks)
        .await
        .expect("second tick");
    assert_eq!(started, 1);
    while tasks.join_next().await.is_some() {}

    let article = store.get_article(article_id).await.expect("get article");
    assert_eq!(article.status, ArticleStatus::Failed);
    assert_eq!(article.retry_count, 2);

    let job = store.get_job(&job_id).await.expect("get job");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_count, 1);
    assert_eq!(job.completed_count, 0);
}

#[sqlx::test(migrations = "../core/migrations")]
async fn cancelling_a_job_reassigns_its_queued_item_to_a_surviving_sibling(db: PgPool) {
    let store = Store::from_pool(db.clone());
    let queue = Queue::new(db.clone());
    let publisher = Publisher::new(db.clone());
    let submitter = Submitter::new(&store, &queue, &publisher);

    let request = || scrape_core::ArticleRequest {
        url: "https://news.example/shared".to_string(),
        source: None,
        category: None,
        priority: 5,
    };

    let job_a = submitter.submit(vec![request()]).await.expect("submit a");
    // job_b references the same still-pending article - classified
    // AlreadyScheduled, so it never gets a queue item of its own. The one
    // item in the queue was enqueued on job_a's behalf.
    let job_b = submitter.submit(vec![request()]).await.expect("submit b");

    let (_, drained) = scrape_core::cancel_job(&store, &queue, &publisher, &job_a.id)
        .await
        .expect("cancel a");
    assert_eq!(
        drained, 0,
        "the one queued item has a surviving sibling (job_b), so nothing is deleted"
    );

    // Popping and running that item to completion must credit job_b, the
    // still-live sibling it was reassigned to - not get silently dropped as
    // belonging to job_a, which is now cancelled.
    let context = context(db.clone(), Arc::new(AlwaysSucceeds), 3).await;
    let mut tasks = JoinSet::new();
    let started = scrape_worker::engine::tick(context.clone(), &mut tasks)
        .await
        .expect("tick");
    assert_eq!(started, 1);
    while tasks.join_next().await.is_some() {}

    let job_b = store.get_job(&job_b.id).await.expect("get job_b");
    assert_eq!(job_b.status, JobStatus::Completed);
    assert_eq!(job_b.completed_count, 1);
    assert_eq!(job_b.failed_count, 0);

    let job_a = store.get_job(&job_a.id).await.expect("get job_a");
    assert_eq!(job_a.status, JobStatus::Cancelled);
    assert_eq!(job_a.completed_count, 0);
}

#[sqlx::test(migrations = "../core/migrations")]
async fn a_three_article_job_publishes_exactly_one_combined_event_per_article(db: PgPool) {
    let store = Store::from_pool(db.clone());
    let queue = Queue::new(db.clone());
    let publisher = Publisher::new(db.clone());
    let submitter = Submitter::new(&store, &queue, &publisher);

    let requests = vec![
        scrape_core::ArticleRequest {
            url: "https://news.example/a".to_string(),
            source: None,
            category: None,
            priority: 5,
        },
        scrape_core::ArticleRequest {
            url: "https://news.example/b".to_string(),
            source: None,
            category: None,
            priority: 5,
        },
        scrape_core::ArticleRequest {
            url: "https://news.example/c".to_string(),
            source: None,
            category: None,
            priority: 5,
        },
    ];
    let job = submitter.submit(requests).await.expect("submit");

    let mut listener = PgListener::connect_with(&db).await.expect("listener");
    listener
        .listen(scrape_core::CHANNEL)
        .await
        .expect("listen");

    let context = context(db.clone(), Arc::new(AlwaysSucceeds), 3).await;
    let mut tasks = JoinSet::new();
    let started = scrape_worker::engine::tick(context.clone(), &mut tasks)
        .await
        .expect("tick");
    assert_eq!(started, 3);
    while tasks.join_next().await.is_some() {}

    let mut transitions = Vec::new();
    while transitions.len() < 3 {
        let notification = tokio::time::timeout(StdDuration::from_secs(2), listener.recv())
            .await
            .expect("notification arrives")
            .expect("listener stays connected");
        let event: serde_json::Value =
            serde_json::from_str(notification.payload()).expect("valid json");
        if event["type"] == "article_transition" {
            transitions.push(event);
        }
    }

    assert_eq!(transitions.len(), 3);
    for event in &transitions {
        assert_eq!(event["job_id"], job.id);
        assert!(event["article_id"].is_string());
        assert_eq!(event["status"], "SCRAPED");
        assert!(event["completed_count"].as_i64().unwrap() >= 1);
        assert_eq!(event["total_articles"], 3);
    }
}
