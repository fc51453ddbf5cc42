pub const WORKER_SAT: &str = "scrape_worker_available_permits";
pub const WORKER_DEQUEUED: &str = "scrape_worker_dequeued_items";
pub const DEQUEUE_TIME: &str = "scrape_worker_dequeue_ms";
pub const SPAWN_TIME: &str = "scrape_worker_spawn_tasks_ms";
pub const ITEM_TOTAL_TIME: &str = "scrape_worker_item_total_run_ms";
pub const SCRAPE_REQUEST_TIME: &str = "scrape_worker_scrape_request_ms";
pub const ITEM_ERRORS: &str = "scrape_worker_item_errors";

pub const OUTCOME_LABEL: &str = "outcome";
