use scrape_core::{ArticleRequest, Publisher, Queue, Store};
use sqlx::PgPool;

#[allow(dead_code)]
pub fn request(url: &str, priority: i16) -> ArticleRequest {
    ArticleRequest {
        url: url.to_string(),
        source: Some("test-suite".to_string()),
        category: Some("general".to_string()),
        priority,
    }
}

#[allow(dead_code)]
pub fn harness(db: PgPool) -> (Store, Queue, Publisher) {
    let store = Store::from_pool(db.clone());
    let queue = Queue::new(db.clone());
    let publisher = Publisher::new(db);
    (store, queue, publisher)
}
