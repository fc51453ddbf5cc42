use crate::bus::{DomainEvent, Publisher};
use crate::dedup::Deduplicator;
use crate::error::QueueError;
use crate::queue::Queue;
use crate::store::Store;
use crate::types::{ArticleRequest, DedupOutcome, Job, JobStatus, QueueName};

/// C5 Submitter - validates an incoming batch, deduplicates it against the
/// store, creates the Job row, and only then makes queue items for the
/// articles that actually need scraping visible. The job row always exists
/// before any of its queue items do, so a worker can never dequeue work for
/// a job that a status lookup can't yet find.
pub struct Submitter<'a> {
    store: &'a Store,
    queue: &'a Queue,
    publisher: &'a Publisher,
}

impl<'a> Submitter<'a> {
    pub fn new(store: &'a Store, queue: &'a Queue, publisher: &'a Publisher) -> Self {
        Self {
            store,
            queue,
            publisher,
        }
    }

    pub async fn submit(&self, requests: Vec<ArticleRequest>) -> Result<Job, QueueError> {
        if requests.is_empty() {
            return Err(QueueError::Validation(
                "a job must include at least one article".to_string(),
            ));
        }
        for req in &requests {
            if url::Url::parse(&req.url).is_err() {
                return Err(QueueError::Validation(format!(
                    "article url is not a valid absolute url: {}",
                    req.url
                )));
            }
            if !(1..=10).contains(&req.priority) {
                return Err(QueueError::Validation(format!(
                    "article priority must be in 1..=10, got {}",
                    req.priority
                )));
            }
        }

        let deduped_urls = Deduplicator::dedup_within_batch(
            &requests.iter().map(|r| r.url.clone()).collect::<Vec<_>>(),
        );
        let mut by_url = std::collections::HashMap::new();
        for req in requests {
            by_url.entry(req.url.clone()).or_insert(req);
        }

        let dedup = Deduplicator::new(self.store);
        let mut article_ids = Vec::with_capacity(deduped_urls.len());
        let mut new_articles = 0i32;
        let mut cached_articles = 0i32;
        let mut to_enqueue = Vec::new();
        let mut already_scraped = Vec::new();

        for url in &deduped_urls {
            let req = by_url.get(url).expect("url came from this same batch");
            let (article, outcome) = dedup.classify(req).await?;
            article_ids.push(article.id);
            self.store.increment_reference_count(article.id).await?;
            common_metrics::inc(crate::metrics::ARTICLES_SUBMITTED, &[], 1);

            match outcome {
                DedupOutcome::Miss => {
                    new_articles += 1;
                    to_enqueue.push(article);
                }
                DedupOutcome::AlreadyScheduled => {
                    new_articles += 1;
                }
                DedupOutcome::CacheHit => {
                    cached_articles += 1;
                    already_scraped.push(article);
                }
            }
        }

        // A batch entirely satisfied from cache completes the instant the Job
        // exists; otherwise the Job starts IN_PROGRESS and waits on workers.
        let initial_status = if new_articles > 0 {
            JobStatus::InProgress
        } else {
            JobStatus::Completed
        };

        let cached_article_ids = already_scraped.iter().map(|a| a.id).collect::<Vec<_>>();
        let job = self
            .store
            .create_job(
                Job::new_id(),
                initial_status,
                deduped_urls.len() as i32,
                new_articles,
                cached_articles,
                already_scraped.len() as i32,
                article_ids,
                cached_article_ids,
            )
            .await?;

        for article in &to_enqueue {
            self.queue
                .push_tail(
                    priority_to_queue(article.priority),
                    &job.id,
                    article.id,
                    &article.url,
                    article.priority,
                )
                .await?;
        }

        self.publisher
            .publish(&DomainEvent::JobProgress {
                job_id: job.id.clone(),
                completed_count: job.completed_count,
                failed_count: job.failed_count,
                total_articles: job.total_articles,
            })
            .await?;

        Ok(job)
    }
}

/// Priority 1-10 buckets into the three queue bands; lower numbers are
/// more urgent, matching the documented priority band mapping
/// (1-3 -> high, 4-7 -> medium, 8-10 -> low).
pub fn priority_to_queue(priority: i16) -> QueueName {
    if priority <= 3 {
        QueueName::High
    } else if priority <= 7 {
        QueueName::Medium
    } else {
        QueueName::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_buckets_match_documented_scale() {
        assert_eq!(priority_to_queue(1), QueueName::High);
        assert_eq!(priority_to_queue(3), QueueName::High);
        assert_eq!(priority_to_queue(4), QueueName::Medium);
        assert_eq!(priority_to_queue(7), QueueName::Medium);
        assert_eq!(priority_to_queue(8), QueueName::Low);
        assert_eq!(priority_to_queue(10), QueueName::Low);
    }
}
