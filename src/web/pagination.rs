use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

fn default_index() -> u64 {
    1
}

fn default_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// 1-based page selector for the task listing. Missing query params fall
/// back to the defaults at deserialization; out-of-range values are
/// normalized by the accessors, so callers never see a zero limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_index")]
    pub index: u64,
    #[serde(default = "default_size")]
    pub size: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            index: default_index(),
            size: default_size(),
        }
    }
}

impl Pagination {
    pub fn limit(&self) -> u64 {
        self.size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        self.index.saturating_sub(1) * self.limit()
    }
}
