pub const POSTS_PROCESSED: &str = "consumer_posts_processed";
pub const PROCESSED_TOTAL_GAUGE: &str = "consumer_processed_total";
pub const POSTS_RECEIVED: &str = "consumer_posts_received";
pub const EMPTY_MESSAGES: &str = "consumer_empty_messages";
pub const MESSAGE_PARSE_ERROR: &str = "consumer_message_parse_error";
pub const OFFSET_STORE_ERROR: &str = "consumer_offset_store_error";
pub const CACHE_WRITE_ERROR: &str = "consumer_cache_write_error";
pub const BATCH_FLUSH_TIME: &str = "consumer_batch_flush_time_ms";
pub const BATCH_ROWS_INSERTED: &str = "consumer_batch_rows_inserted";
pub const BATCH_POSTS_DROPPED: &str = "consumer_batch_posts_dropped";
pub const BATCH_ATTEMPT: &str = "consumer_batch_attempt";
pub const BUFFER_DEPTH: &str = "consumer_buffer_depth";
