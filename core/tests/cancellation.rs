use scrape_core::{cancel_job, JobStatus, Submitter};
use sqlx::PgPool;

mod common;
use common::{harness, request};

#[sqlx::test(migrations = "./migrations")]
async fn cancelling_a_job_drains_its_queued_items(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let requests = (0..10)
        .map(|i| request(&format!("https://news.example/{i}"), 10))
        .collect();
    let job = submitter.submit(requests).await.expect("submit");

    let before = queue.depth().await.expect("depth");
    let queued_before: i64 = before.iter().map(|(_, n)| n).sum();
    assert_eq!(queued_before, 10);

    let (cancelled, drained) = cancel_job(&store, &queue, &publisher, &job.id)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert_eq!(drained, 10);

    let after = queue.depth().await.expect("depth");
    let queued_after: i64 = after.iter().map(|(_, n)| n).sum();
    assert_eq!(queued_after, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn cancelling_a_terminal_job_is_rejected(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    // All-cached batch completes synchronously on submit.
    let (article, _) = store
        .upsert_article_pending(&request("https://news.example/done", 5))
        .await
        .expect("upsert");
    store
        .update_article(
            article.id,
            None,
            scrape_core::ArticleUpdate::scraped("T".to_string(), "C".to_string()),
        )
        .await
        .expect("mark scraped");

    let job = submitter
        .submit(vec![request("https://news.example/done", 5)])
        .await
        .expect("submit");
    assert_eq!(job.status, JobStatus::Completed);

    let err = cancel_job(&store, &queue, &publisher, &job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, scrape_core::QueueError::AlreadyTerminal(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn cancellation_does_not_strand_a_sibling_jobs_shared_article(db: PgPool) {
    let (store, queue, publisher) = harness(db);
    let submitter = Submitter::new(&store, &queue, &publisher);

    let job_a = submitter
        .submit(vec![request("https://news.example/shared", 9)])
        .await
        .expect("submit a");
    // Second job references the same (still-pending) article: an
    // AlreadyScheduled classification, no new queue item for job_b.
    let job_b = submitter
        .submit(vec![request("https://news.example/shared", 9)])
        .await
        .expect("submit b");

    cancel_job(&store, &queue, &publisher, &job_a.id)
        .await
        .expect("cancel a");

    // job_b is still in flight and still depends on the article, so its
    // queue item (owned by job_a, the original enqueuer) must survive.
    let depth = queue.depth().await.expect("depth");
    let total: i64 = depth.iter().map(|(_, n)| n).sum();
    assert_eq!(total, 1);

    let job_b = store.get_job(&job_b.id).await.expect("get job_b");
    assert_eq!(job_b.status, scrape_core::JobStatus::InProgress);
}
