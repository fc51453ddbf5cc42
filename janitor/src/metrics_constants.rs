pub const RUN_STARTS: &str = "scrape_janitor_run_starts";
pub const RUN_TIME: &str = "scrape_janitor_total_run_ms";
pub const RUN_ENDS: &str = "scrape_janitor_run_ends";

pub const STALLED_COUNT: &str = "scrape_janitor_stalled_articles_reset";
pub const STALLED_TIME: &str = "scrape_janitor_stalled_articles_reset_ms";

pub const JOBS_DELETED_COUNT: &str = "scrape_janitor_jobs_deleted";
pub const JOBS_DELETED_TIME: &str = "scrape_janitor_jobs_deleted_ms";
