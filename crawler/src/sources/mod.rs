use async_trait::async_trait;
use common_types::Post;

use crate::fetch::FetchError;

mod devto;
mod hackernews;
mod medium;

pub use devto::DevtoAdapter;
pub use hackernews::HackerNewsAdapter;
pub use medium::MediumAdapter;

/// Minimum pause between sub-source requests (tags, feed topics).
pub(crate) const SUB_SOURCE_DELAY_MS: u64 = 200;

/// One upstream source. `fetch` returns the full batch for a crawl run;
/// per-sub-source failures are absorbed (logged, empty slice) so one bad
/// tag or feed never fails the whole run.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Post>, FetchError>;
    fn name(&self) -> &'static str;
}
