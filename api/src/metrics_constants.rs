pub const JOBS_SUBMITTED: &str = "scrape_api_jobs_submitted";
pub const JOBS_CANCELLED: &str = "scrape_api_jobs_cancelled";
pub const WS_CONNECTIONS: &str = "scrape_api_ws_connections";
pub const WS_MESSAGES_SENT: &str = "scrape_api_ws_messages_sent";

pub const SCOPE_LABEL: &str = "scope";
