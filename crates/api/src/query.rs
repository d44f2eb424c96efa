//! Query parameter types shared by several handlers.

use serde::Deserialize;

/// `?q=&limit=&offset=` for listing search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
