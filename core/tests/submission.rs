use scrape_core::{ArticleStatus, JobStatus, Submitter};
use sqlx::PgPool;

mod common;
use common::{harness, request};

#[sqlx::test(migrations = "./migrations")]
async fn fresh_batch_schedules_both_articles(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let job = submitter
        .submit(vec![request("https://news.example/a", 1), request("https://news.example/b", 5)])
        .await
        .expect("submit should succeed");

    assert_eq!(job.total_articles, 2);
    assert_eq!(job.new_articles, 2);
    assert_eq!(job.cached_articles, 0);
    assert_eq!(job.status, JobStatus::InProgress);

    let depth = queue.depth().await.expect("queue depth");
    let total_queued: i64 = depth.iter().map(|(_, n)| n).sum();
    assert_eq!(total_queued, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn all_cached_batch_completes_immediately_without_enqueuing(db: PgPool) {
    let (store, queue, publisher) = harness(db);

    // Pre-populate a SCRAPED article the way a worker would leave it.
    let (article, _) = store
        .upsert_article_pending(&request("https://news.example/cached", 3))
        .await
        .expect("upsert");
    store
        .update_article(
            article.id,
            None,
            scrape_core::ArticleUpdate::scraped("Cached".to_string(), "Body".to_string()),
        )
        .await
        .expect("mark scraped");

    let submitter = Submitter::new(&store, &queue, &publisher);
    let job = submitter
        .submit(vec![request("https://news.example/cached", 9)])
        .await
        .expect("submit should succeed");

    assert_eq!(job.total_articles, 1);
    assert_eq!(job.new_articles, 0);
    assert_eq!(job.cached_articles, 1);
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_count, 1);

    let depth = queue.depth().await.expect("queue depth");
    let total_queued: i64 = depth.iter().map(|(_, n)| n).sum();
    assert_eq!(total_queued, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn within_batch_duplicate_collapses_to_first_occurrence(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let job = submitter
        .submit(vec![request("https://news.example/x", 1), request("https://news.example/x", 9)])
        .await
        .expect("submit should succeed");

    assert_eq!(job.total_articles, 1);
    assert_eq!(job.new_articles, 1);

    let popped = queue.pop_batch(10).await.expect("pop");
    assert_eq!(popped.len(), 1);
    // The first occurrence's priority (1, the "high" band) wins.
    assert_eq!(popped[0].priority, 1);
    assert_eq!(popped[0].queue_name, scrape_core::QueueName::High);
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_batch_is_rejected(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let err = submitter.submit(vec![]).await.unwrap_err();
    assert!(matches!(err, scrape_core::QueueError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn malformed_url_is_rejected(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let err = submitter
        .submit(vec![request("not-a-url", 5)])
        .await
        .unwrap_err();
    assert!(matches!(err, scrape_core::QueueError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn dedup_is_commutative_across_submission_order(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let batch_a = vec![request("https://news.example/1", 2), request("https://news.example/2", 4)];
    let batch_b = vec![request("https://news.example/2", 6), request("https://news.example/3", 8)];

    submitter.submit(batch_a).await.expect("submit a");
    submitter.submit(batch_b).await.expect("submit b");

    let second_url_article = store
        .get_article_by_url("https://news.example/2")
        .await
        .expect("lookup")
        .expect("article exists");

    // The shared URL across both batches resolved to exactly one article,
    // referenced by both jobs regardless of submission order.
    assert_eq!(second_url_article.reference_count, 2);
    assert_eq!(second_url_article.status, ArticleStatus::Pending);
}
