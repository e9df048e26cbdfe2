//! Query API with flexible filtering.

use crate::graph_store::GraphStore;
use crate::store::Store;
use crate::types::{Filter, GroupId, Task, TaskState};
use eyre::Result;

/// Query builder for fluent queries.
pub struct Query<'a, B: GraphStore> {
    backend: &'a B,
    filter: Filter,
}

impl<'a, B: GraphStore> Query<'a, B> {
    pub(crate) fn new(backend: &'a B) -> Self {
        Self {
            backend,
            filter: Filter::new(),
        }
    }

    /// Filter by state.
    pub fn state(mut self, state: TaskState) -> Self {
        self.filter = self.filter.state(state);
        self
    }

    /// Filter by group.
    pub fn group(mut self, group_id: GroupId) -> Self {
        self.filter = self.filter.group(group_id);
        self
    }

    /// Filter by name substring.
    pub fn name_contains(mut self, substring: impl Into<String>) -> Self {
        self.filter = self.filter.name_contains(substring);
        self
    }

    /// Execute the query and return matching tasks, ordered by ID.
    pub fn execute(self) -> Result<Vec<Task>> {
        self.backend.list_tasks(&self.filter)
    }

    pub fn count(self) -> Result<usize> {
        Ok(self.execute()?.len())
    }
}

/// Extension trait to add query method to Store.
pub trait StoreQueryExt {
    type Backend: GraphStore;

    /// Start building a query.
    fn query(&self) -> Query<'_, Self::Backend>;

    /// Query with a pre-built filter.
    fn query_with_filter(&self, filter: &Filter) -> Result<Vec<Task>>;
}

impl<B: GraphStore> StoreQueryExt for Store<B> {
    type Backend = B;

    fn query(&self) -> Query<'_, B> {
        Query::new(self.backend())
    }

    fn query_with_filter(&self, filter: &Filter) -> Result<Vec<Task>> {
        self.backend().list_tasks(filter)
    }
}
