use crate::error::QueueError;
use crate::store::{ArticleUpdate, Store};
use crate::types::{Article, ArticleRequest, ArticleStatus, DedupOutcome};

/// C4 Deduplicator - first occurrence of a URL wins. Built directly on top
/// of `Store::upsert_article_pending`'s insert-or-get-existing semantics, so
/// the "exactly one caller sees `Miss`" guarantee comes from the database,
/// not from in-process locking.
pub struct Deduplicator<'a> {
    store: &'a Store,
}

impl<'a> Deduplicator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Resolves one URL against the store, classifying the result and
    /// leaving the article row in a state ready for its caller to act on.
    pub async fn classify(
        &self,
        req: &ArticleRequest,
    ) -> Result<(Article, DedupOutcome), QueueError> {
        let (article, inserted) = self.store.upsert_article_pending(req).await?;

        if inserted {
            return Ok((article, DedupOutcome::Miss));
        }

        match article.status {
            ArticleStatus::Scraped => {
                common_metrics::inc(crate::metrics::ARTICLES_DEDUP_HIT, &[], 1);
                Ok((article, DedupOutcome::CacheHit))
            }
            ArticleStatus::Pending | ArticleStatus::Scraping => {
                common_metrics::inc(crate::metrics::ARTICLES_DEDUP_SCHEDULED, &[], 1);
                Ok((article, DedupOutcome::AlreadyScheduled))
            }
            ArticleStatus::Failed => {
                // A URL that previously failed is a candidate for another
                // attempt, not a permanent cache entry - reset it to Pending
                // so the caller treats it like a fresh Miss.
                let reset = self
                    .store
                    .update_article(
                        article.id,
                        Some(ArticleStatus::Failed),
                        ArticleUpdate {
                            status: Some(ArticleStatus::Pending),
                            error_message: Some(None),
                            retry_count: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok((reset, DedupOutcome::Miss))
            }
        }
    }

    /// Within a single submitted batch, duplicate URLs collapse to their
    /// first occurrence - the caller only ever sees one entry per URL here.
    pub fn dedup_within_batch(urls: &[String]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        urls.iter()
            .filter(|url| seen.insert((*url).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_batch_duplicates_collapse_to_first_occurrence() {
        let urls = vec![
            "https://a.example/1".to_string(),
            "https://a.example/2".to_string(),
            "https://a.example/1".to_string(),
        ];
        let deduped = Deduplicator::dedup_within_batch(&urls);
        assert_eq!(deduped, vec!["https://a.example/1", "https://a.example/2"]);
    }
}
