use std::collections::BTreeMap;

/// Query options shared by the list surface and every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Top-level field equality filters.
    pub filter: BTreeMap<String, String>,
    /// Field → `asc` | `desc`.
    pub sort: BTreeMap<String, String>,
    /// 1-indexed page number.
    pub page: u32,
    pub limit: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: BTreeMap::new(),
            sort: BTreeMap::new(),
            page: 1,
            limit: 20,
        }
    }
}

/// One page of adapter results.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}
