use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task;
use tokio::time::sleep;

use crate::backend::{FilterCriteria, PageFetchError, QueryBackend};
use crate::records::{record_category, Record};

/// Pages fetched concurrently per batch. Batch N+1 is never issued before
/// batch N has fully settled.
pub const PARALLEL_PAGES: u64 = 10;

/// How long init may stay unanswered before the caller gets a notice.
pub const FIRST_FEEDBACK: Duration = Duration::from_secs(5);

/// Server-tracked cursor over one progressive query.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub query_id: String,
    pub total_pages: u64,
    pub total_records: u64,
    /// Next page to request, 1-based.
    pub current_page: u64,
    pub loaded_records: u64,
    pub is_complete: bool,
    pub active: bool,
}

/// Completion statistics reported once a query finishes loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub total_records: u64,
    pub by_record_type: BTreeMap<String, u64>,
}

/// Progress notifications delivered while a query loads. `Progress` fires
/// after init and after every settled batch; `Complete` follows the last
/// `Progress`.
#[derive(Clone, Debug)]
pub enum LoadEvent {
    /// Init has not answered within [`FIRST_FEEDBACK`].
    SlowInit,
    Started {
        total_pages: u64,
        total_records: u64,
    },
    Progress {
        loaded_records: u64,
        total_records: u64,
        pages_fetched: u64,
        total_pages: u64,
    },
    /// One page failed and its rows were dropped; the session continues.
    PageDropped { page: u64, message: String },
    Complete { summary: LoadSummary },
}

/// How a `start_query` call ended when it did not error: either it ran the
/// query to completion, or another `start_query` superseded it mid-flight
/// and its remaining work was discarded.
#[derive(Clone, Debug)]
pub enum LoadOutcome {
    Completed(LoadSummary),
    Superseded,
}

#[derive(Debug, Error)]
pub enum LoadError {
    /// Required filter field missing; no request was sent.
    #[error("missing required filter field: {field}")]
    Validation { field: &'static str },

    /// Query setup failed; no session was started.
    #[error("failed to initialize query: {source}")]
    Init {
        #[source]
        source: PageFetchError,
    },

    /// Every page of one batch failed. The session is aborted; rows loaded
    /// so far are retained and still exportable.
    #[error("pages {first_page}-{last_page} all failed: {source}")]
    Batch {
        first_page: u64,
        last_page: u64,
        #[source]
        source: PageFetchError,
    },
}

impl LoadError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { field } => {
                format!("please fill in the {field} field before searching")
            }
            Self::Init { source } => source.user_message(),
            Self::Batch { source, .. } => {
                format!("{}; keeping the rows loaded so far", source.user_message())
            }
        }
    }
}

#[derive(Default)]
struct Inner {
    session: SessionState,
    buffer: Vec<Record>,
    generation: u64,
}

/// Drives one progressive query to completion: init, then concurrent page
/// batches merged in page order, then summary statistics.
///
/// Exactly one query is active per loader; calling [`Loader::start_query`]
/// again supersedes the previous session, and any of its fetches that settle
/// afterwards are discarded unmerged. Supersession is detected by comparing
/// a captured generation, not a flag, so two rapid consecutive starts
/// resolve correctly.
#[derive(Clone)]
pub struct Loader {
    backend: Arc<dyn QueryBackend>,
    inner: Arc<Mutex<Inner>>,
}

impl Loader {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            backend,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Snapshot of the current session state.
    pub async fn session(&self) -> SessionState {
        self.inner.lock().await.session.clone()
    }

    /// Snapshot of the rows accumulated so far, in server page order. The
    /// buffer survives a mid-session abort, so partial results stay
    /// exportable.
    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.buffer.clone()
    }

    pub async fn start_query(
        &self,
        criteria: FilterCriteria,
        events: mpsc::Sender<LoadEvent>,
    ) -> Result<LoadOutcome, LoadError> {
        if criteria.start.trim().is_empty() {
            return Err(LoadError::Validation { field: "start" });
        }
        if criteria.end.trim().is_empty() {
            return Err(LoadError::Validation { field: "end" });
        }

        // Supersede whatever was running and claim the new generation.
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.session = SessionState::default();
            inner.buffer.clear();
            inner.generation
        };

        let init = {
            let init_fut = self.backend.init_query(&criteria);
            tokio::pin!(init_fut);
            let notice = sleep(FIRST_FEEDBACK);
            tokio::pin!(notice);
            let mut notified = false;
            loop {
                tokio::select! {
                    res = &mut init_fut => break res,
                    _ = &mut notice, if !notified => {
                        notified = true;
                        let _ = events.send(LoadEvent::SlowInit).await;
                    }
                }
            }
        };
        let init = init.map_err(|source| LoadError::Init { source })?;

        {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return Ok(LoadOutcome::Superseded);
            }
            inner.session = SessionState {
                query_id: init.query_id,
                total_pages: init.total_pages,
                total_records: init.total_records,
                current_page: 1,
                loaded_records: 0,
                is_complete: false,
                active: true,
            };
        }
        let _ = events
            .send(LoadEvent::Started {
                total_pages: init.total_pages,
                total_records: init.total_records,
            })
            .await;

        loop {
            let (query_id, pages) = {
                let inner = self.inner.lock().await;
                if inner.generation != generation {
                    tracing::debug!(generation, "query superseded, stopping batch loop");
                    return Ok(LoadOutcome::Superseded);
                }
                (
                    inner.session.query_id.clone(),
                    batch_pages(inner.session.current_page, inner.session.total_pages),
                )
            };

            // An empty run is the termination condition besides the server's
            // explicit last-page flag.
            if pages.is_empty() {
                return self.finish(generation, &events).await;
            }

            let fetches = pages.iter().map(|&page| {
                let backend = Arc::clone(&self.backend);
                let query_id = query_id.clone();
                async move { (page, backend.fetch_page(&query_id, page).await) }
            });
            // join_all settles every fetch and yields results in input
            // order, which is ascending page order; arrival order never
            // reaches the merge.
            let settled = join_all(fetches).await;

            let first_page = pages[0];
            let last_page = *pages.last().unwrap_or(&first_page);
            let mut saw_last_page = false;
            let mut failed = 0usize;
            let mut first_error: Option<PageFetchError> = None;
            let mut pending: Vec<LoadEvent> = Vec::new();

            let outcome = {
                let mut inner = self.inner.lock().await;
                if inner.generation != generation {
                    tracing::debug!(generation, "query superseded, discarding settled batch");
                    return Ok(LoadOutcome::Superseded);
                }
                for (page, result) in settled {
                    match result {
                        Ok(data) => {
                            saw_last_page |= data.is_last_page;
                            inner.session.loaded_records += data.records.len() as u64;
                            inner.buffer.extend(data.records);
                        }
                        Err(error) => {
                            tracing::warn!(page, error = %error, "dropping failed page");
                            pending.push(LoadEvent::PageDropped {
                                page,
                                message: error.user_message(),
                            });
                            failed += 1;
                            if first_error.is_none() {
                                first_error = Some(error);
                            }
                        }
                    }
                }

                if failed == pages.len() {
                    // The whole batch went down: abort, keep the buffer.
                    inner.session.active = false;
                    None
                } else {
                    inner.session.current_page += PARALLEL_PAGES;
                    Some(LoadEvent::Progress {
                        loaded_records: inner.session.loaded_records,
                        total_records: inner.session.total_records,
                        pages_fetched: last_page.min(inner.session.total_pages),
                        total_pages: inner.session.total_pages,
                    })
                }
            };

            for event in pending {
                let _ = events.send(event).await;
            }
            match outcome {
                None => {
                    let source = first_error.unwrap_or(PageFetchError::Timeout);
                    return Err(LoadError::Batch {
                        first_page,
                        last_page,
                        source,
                    });
                }
                Some(progress) => {
                    let _ = events.send(progress).await;
                }
            }

            let reached_end = {
                let inner = self.inner.lock().await;
                last_page >= inner.session.total_pages
            };
            if saw_last_page || reached_end {
                return self.finish(generation, &events).await;
            }

            // Yield between batches; the loop must never monopolize the
            // executor while a large load streams in.
            task::yield_now().await;
        }
    }

    async fn finish(
        &self,
        generation: u64,
        events: &mpsc::Sender<LoadEvent>,
    ) -> Result<LoadOutcome, LoadError> {
        let summary = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return Ok(LoadOutcome::Superseded);
            }
            inner.session.is_complete = true;
            inner.session.active = false;
            summarize(&inner.buffer)
        };
        let _ = events
            .send(LoadEvent::Complete {
                summary: summary.clone(),
            })
            .await;
        Ok(LoadOutcome::Completed(summary))
    }
}

fn batch_pages(current_page: u64, total_pages: u64) -> Vec<u64> {
    if current_page == 0 || current_page > total_pages {
        return Vec::new();
    }
    let end = (current_page + PARALLEL_PAGES - 1).min(total_pages);
    (current_page..=end).collect()
}

fn summarize(buffer: &[Record]) -> LoadSummary {
    let mut by_record_type: BTreeMap<String, u64> = BTreeMap::new();
    for record in buffer {
        *by_record_type.entry(record_category(record)).or_insert(0) += 1;
    }
    LoadSummary {
        total_records: buffer.len() as u64,
        by_record_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_pages_clips_to_total() {
        assert_eq!(batch_pages(1, 25), (1..=10).collect::<Vec<_>>());
        assert_eq!(batch_pages(21, 25), (21..=25).collect::<Vec<_>>());
        assert_eq!(batch_pages(11, 12), vec![11, 12]);
    }

    #[test]
    fn batch_pages_empty_when_exhausted() {
        assert!(batch_pages(11, 10).is_empty());
        assert!(batch_pages(1, 0).is_empty());
        assert!(batch_pages(0, 10).is_empty());
    }

    #[test]
    fn summarize_counts_by_category() {
        let rows: Vec<Record> = vec![
            json!({"record_type": "inbound"}),
            json!({"record_type": "inbound"}),
            json!({"record_type": "campaign"}),
            json!({}),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let summary = summarize(&rows);
        assert_eq!(summary.total_records, 4);
        assert_eq!(summary.by_record_type.get("inbound"), Some(&2));
        assert_eq!(summary.by_record_type.get("campaign"), Some(&1));
        assert_eq!(summary.by_record_type.get("unknown"), Some(&1));
    }
}
