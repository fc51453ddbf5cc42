pub const ARTICLES_SUBMITTED: &str = "scrape_articles_submitted";
pub const ARTICLES_DEDUP_HIT: &str = "scrape_articles_dedup_hit";
pub const ARTICLES_DEDUP_SCHEDULED: &str = "scrape_articles_dedup_already_scheduled";
pub const QUEUE_PUSH: &str = "scrape_queue_push";
pub const QUEUE_POP: &str = "scrape_queue_pop";
pub const QUEUE_DEPTH: &str = "scrape_queue_depth";
pub const JOB_CREATED: &str = "scrape_job_created";
pub const JOB_COMPLETED: &str = "scrape_job_completed";
pub const JOB_CANCELLED: &str = "scrape_job_cancelled";
pub const SCRAPE_ATTEMPT: &str = "scrape_attempt";
pub const SCRAPE_SUCCESS: &str = "scrape_success";
pub const SCRAPE_FAILURE: &str = "scrape_failure";
pub const SCRAPE_RETRY: &str = "scrape_retry";
pub const JANITOR_STALLED_RESET: &str = "scrape_janitor_stalled_reset";
pub const JANITOR_JOBS_DELETED: &str = "scrape_janitor_jobs_deleted";
