//! Search-as-you-type suggestions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};
use vitrine_core::ProductSummary;

use crate::backend::{Backend, Direction, Query, decode_rows, tables};
use crate::error::{Action, ActionContext, Result};

use super::catalog::SEARCH_COLUMNS;

/// Quiet period before a typed term is searched.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Maximum number of suggestions returned.
pub const SUGGESTION_LIMIT: usize = 5;

/// Up to five active products whose code, name, barcode or description
/// contains `term`, by name. A blank term yields no suggestions without
/// touching the backend.
///
/// # Errors
///
/// Returns an error if the backend query fails.
#[instrument(skip(backend))]
pub async fn search_suggestions(backend: &dyn Backend, term: &str) -> Result<Vec<ProductSummary>> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let query = Query::table(tables::PRODUCTS)
        .columns(["id", "code", "name", "description", "barcode"])
        .search(SEARCH_COLUMNS, term)
        .eq("active", true)
        .order("name", Direction::Asc)
        .limit(SUGGESTION_LIMIT);
    let rows = backend.select(&query).await.during(Action::SearchProducts)?;
    decode_rows(rows).during(Action::SearchProducts)
}

/// Latest published suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    /// Term the suggestions were computed for.
    pub term: String,
    pub products: Vec<ProductSummary>,
    /// Inline message when the search failed.
    pub error: Option<String>,
}

/// Runs [`search_suggestions`] once input has been quiet for [`DEBOUNCE`].
///
/// Each new input restarts the timer, so only the last term of a burst is
/// searched. The background task stops when this value is dropped.
pub struct DebouncedSearch {
    input: mpsc::UnboundedSender<String>,
    results: watch::Receiver<SearchResults>,
    task: JoinHandle<()>,
}

impl DebouncedSearch {
    #[must_use]
    pub fn spawn(backend: Arc<dyn Backend>) -> Self {
        let (input, rx) = mpsc::unbounded_channel();
        let (tx, results) = watch::channel(SearchResults::default());
        let task = tokio::spawn(debounce(backend, rx, tx));
        Self {
            input,
            results,
            task,
        }
    }

    /// Feed the current contents of the search box.
    pub fn input(&self, term: impl Into<String>) {
        // Only fails once the task is gone, which means we are shutting down.
        let _ = self.input.send(term.into());
    }

    #[must_use]
    pub fn results(&self) -> SearchResults {
        self.results.borrow().clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SearchResults> {
        self.results.clone()
    }
}

impl Drop for DebouncedSearch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce(
    backend: Arc<dyn Backend>,
    mut input: mpsc::UnboundedReceiver<String>,
    results: watch::Sender<SearchResults>,
) {
    let mut pending: Option<String> = None;
    loop {
        let Some(term) = pending.take() else {
            match input.recv().await {
                Some(term) => pending = Some(term),
                None => return,
            }
            continue;
        };

        tokio::select! {
            next = input.recv() => match next {
                Some(newer) => pending = Some(newer),
                None => return,
            },
            () = tokio::time::sleep(DEBOUNCE) => {
                let published = match search_suggestions(backend.as_ref(), &term).await {
                    Ok(products) => {
                        debug!(term = %term, count = products.len(), "Search suggestions ready");
                        SearchResults { term, products, error: None }
                    }
                    Err(e) => {
                        e.report();
                        SearchResults { term, products: Vec::new(), error: Some(e.user_message()) }
                    }
                };
                results.send_replace(published);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::backend::memory::Fault;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        let rows = (1..=7).map(|n| {
            json!({
                "id": format!("3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f0{n}"),
                "code": format!("SUC-{n}"),
                "name": format!("Suco {n}"),
                "description": "",
                "price": 5,
                "active": n != 7,
            })
        });
        backend.seed(tables::PRODUCTS, rows);
        backend.seed(
            tables::PRODUCTS,
            [json!({"id": "3f6a9e12-7c4b-4d1e-8a25-0b9c6d4e2f11", "code": "CAF", "name": "Café", "description": "Torrado", "price": 20, "active": true})],
        );
        backend
    }

    #[tokio::test]
    async fn test_blank_term_skips_backend() {
        let backend = backend();
        let found = search_suggestions(&backend, "   ").await.unwrap();
        assert!(found.is_empty());
        assert_eq!(backend.select_calls(tables::PRODUCTS), 0);
    }

    #[tokio::test]
    async fn test_suggestions_are_limited_and_sorted() {
        let backend = backend();
        let found = search_suggestions(&backend, "suc").await.unwrap();
        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Suco 1", "Suco 2", "Suco 3", "Suco 4", "Suco 5"]);

        let found = search_suggestions(&backend, "TORRADO").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "CAF");
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_searches_last_term_only() {
        let backend = backend();
        let search = DebouncedSearch::spawn(Arc::new(backend.clone()));
        let mut results = search.watch();

        search.input("c");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("ca");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("caf");

        results.changed().await.unwrap();
        let latest = search.results();
        assert_eq!(latest.term, "caf");
        assert_eq!(latest.products.len(), 1);
        assert_eq!(backend.select_calls(tables::PRODUCTS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_publishes_error_message() {
        let backend = backend();
        backend.fail(Fault::Select(tables::PRODUCTS.to_owned()), 1);
        let search = DebouncedSearch::spawn(Arc::new(backend));
        let mut results = search.watch();

        search.input("suc");
        results.changed().await.unwrap();
        let latest = search.results();
        assert!(latest.products.is_empty());
        assert_eq!(latest.error.as_deref(), Some("Erro ao buscar produtos"));
    }
}
