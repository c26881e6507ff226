use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::backend::{
    FilterCriteria, InitData, LookupKind, PageData, PageFetchError, QueryBackend,
};
use crate::loader::{LoadError, LoadEvent, LoadOutcome, Loader};
use crate::records::Record;

/// Backend with scripted pages: per-page sizes, optional failures and
/// delays, and a log of everything the controller asked for.
struct ScriptedBackend {
    page_sizes: Vec<usize>,
    last_page_flag: Option<u64>,
    fail_pages: HashSet<u64>,
    page_delays: HashMap<u64, Duration>,
    query_delays: HashMap<String, Duration>,
    init_delay: Duration,
    init_calls: AtomicUsize,
    page_log: Mutex<Vec<u64>>,
    query_counter: AtomicUsize,
}

impl ScriptedBackend {
    fn new(page_sizes: Vec<usize>) -> Self {
        Self {
            page_sizes,
            last_page_flag: None,
            fail_pages: HashSet::new(),
            page_delays: HashMap::new(),
            query_delays: HashMap::new(),
            init_delay: Duration::ZERO,
            init_calls: AtomicUsize::new(0),
            page_log: Mutex::new(Vec::new()),
            query_counter: AtomicUsize::new(0),
        }
    }

    fn total_records(&self) -> u64 {
        self.page_sizes.iter().map(|&n| n as u64).sum()
    }

    fn pages_requested(&self) -> Vec<u64> {
        self.page_log.lock().unwrap().clone()
    }

    fn record(query_id: &str, page: u64, seq: usize) -> Record {
        let kind = ["campaign", "inbound", "outbound"][(page % 3) as usize];
        json!({
            "record_type": kind,
            "query": query_id,
            "page": page,
            "seq": seq,
        })
        .as_object()
        .unwrap()
        .clone()
    }
}

#[async_trait]
impl QueryBackend for ScriptedBackend {
    async fn init_query(&self, _criteria: &FilterCriteria) -> Result<InitData, PageFetchError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if !self.init_delay.is_zero() {
            sleep(self.init_delay).await;
        }
        let n = self.query_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(InitData {
            query_id: format!("q{n}"),
            total_pages: self.page_sizes.len() as u64,
            total_records: self.total_records(),
        })
    }

    async fn fetch_page(&self, query_id: &str, page: u64) -> Result<PageData, PageFetchError> {
        self.page_log.lock().unwrap().push(page);
        if let Some(delay) = self.query_delays.get(query_id) {
            sleep(*delay).await;
        }
        if let Some(delay) = self.page_delays.get(&page) {
            sleep(*delay).await;
        }
        if self.fail_pages.contains(&page) {
            return Err(PageFetchError::ServerError {
                message: format!("page {page} exploded"),
            });
        }
        let size = self
            .page_sizes
            .get(page as usize - 1)
            .copied()
            .unwrap_or(0);
        Ok(PageData {
            records: (0..size).map(|i| Self::record(query_id, page, i)).collect(),
            is_last_page: self.last_page_flag == Some(page),
        })
    }

    async fn fetch_lookup(
        &self,
        _kind: LookupKind,
        _from_ts: i64,
        _to_ts: i64,
    ) -> Result<Vec<String>, PageFetchError> {
        Ok(Vec::new())
    }
}

fn criteria() -> FilterCriteria {
    FilterCriteria {
        start: "2026-08-01 00:00:00".to_string(),
        end: "2026-08-02 00:00:00".to_string(),
        ..Default::default()
    }
}

fn drain(rx: &mut mpsc::Receiver<LoadEvent>) -> Vec<LoadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_count(events: &[LoadEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LoadEvent::Progress { .. }))
        .count()
}

#[tokio::test]
async fn missing_time_range_fails_without_any_network_call() {
    let backend = Arc::new(ScriptedBackend::new(vec![5; 3]));
    let loader = Loader::new(backend.clone());

    let (tx, _rx) = mpsc::channel(16);
    let err = loader
        .start_query(
            FilterCriteria {
                end: "2026-08-02 00:00:00".to_string(),
                ..Default::default()
            },
            tx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Validation { field: "start" }));

    let (tx, _rx) = mpsc::channel(16);
    let err = loader
        .start_query(
            FilterCriteria {
                start: "2026-08-01 00:00:00".to_string(),
                ..Default::default()
            },
            tx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Validation { field: "end" }));

    assert_eq!(backend.init_calls.load(Ordering::SeqCst), 0);
    assert!(backend.pages_requested().is_empty());
}

#[tokio::test]
async fn twenty_five_pages_load_in_three_ascending_batches() {
    let backend = Arc::new(ScriptedBackend::new(vec![2; 25]));
    let loader = Loader::new(backend.clone());

    let (tx, mut rx) = mpsc::channel(1024);
    let outcome = loader.start_query(criteria(), tx).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Completed(_)));

    // ceil(25 / 10) batches, one progress report each.
    let events = drain(&mut rx);
    assert_eq!(progress_count(&events), 3);
    assert_eq!(backend.pages_requested(), (1..=25).collect::<Vec<u64>>());

    let session = loader.session().await;
    assert!(session.is_complete);
    assert_eq!(session.loaded_records, 50);
    assert_eq!(loader.records().await.len(), 50);
}

#[tokio::test]
async fn merge_order_matches_page_order_not_arrival_order() {
    let mut backend = ScriptedBackend::new(vec![2, 2, 1]);
    backend.page_delays.insert(1, Duration::from_millis(60));
    backend.page_delays.insert(2, Duration::from_millis(20));
    let loader = Loader::new(Arc::new(backend));

    let (tx, _rx) = mpsc::channel(1024);
    loader.start_query(criteria(), tx).await.unwrap();

    let pages: Vec<u64> = loader
        .records()
        .await
        .iter()
        .map(|r| r["page"].as_u64().unwrap())
        .collect();
    assert_eq!(pages, vec![1, 1, 2, 2, 3]);
}

#[tokio::test]
async fn superseding_query_discards_in_flight_results() {
    let mut backend = ScriptedBackend::new(vec![2; 2]);
    backend
        .query_delays
        .insert("q1".to_string(), Duration::from_millis(150));
    let loader = Loader::new(Arc::new(backend));

    let first = loader.clone();
    let (tx1, _rx1) = mpsc::channel(64);
    let handle = tokio::spawn(async move { first.start_query(criteria(), tx1).await });

    // Let the first session get its batch in flight, then supersede it.
    sleep(Duration::from_millis(30)).await;
    let (tx2, _rx2) = mpsc::channel(64);
    let second = loader.start_query(criteria(), tx2).await.unwrap();
    let first = handle.await.unwrap().unwrap();

    assert!(matches!(first, LoadOutcome::Superseded));
    assert!(matches!(second, LoadOutcome::Completed(_)));

    let records = loader.records().await;
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r["query"] == "q2"));
    assert_eq!(loader.session().await.loaded_records, 4);
}

#[tokio::test]
async fn one_failed_page_is_dropped_and_the_rest_merge() {
    let mut backend = ScriptedBackend::new(vec![3; 10]);
    backend.fail_pages.insert(5);
    let loader = Loader::new(Arc::new(backend));

    let (tx, mut rx) = mpsc::channel(1024);
    let outcome = loader.start_query(criteria(), tx).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Completed(_)));

    let events = drain(&mut rx);
    let dropped: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            LoadEvent::PageDropped { page, .. } => Some(*page),
            _ => None,
        })
        .collect();
    assert_eq!(dropped, vec![5]);

    let records = loader.records().await;
    assert_eq!(records.len(), 27);
    assert!(records.iter().all(|r| r["page"] != 5));

    let session = loader.session().await;
    assert!(session.is_complete);
    assert_eq!(session.loaded_records, 27);
}

#[tokio::test]
async fn whole_batch_failure_aborts_but_keeps_partial_results() {
    let mut backend = ScriptedBackend::new(vec![3; 20]);
    backend.fail_pages.extend(11..=20);
    let loader = Loader::new(Arc::new(backend));

    let (tx, _rx) = mpsc::channel(1024);
    let err = loader.start_query(criteria(), tx).await.unwrap_err();
    assert!(matches!(
        err,
        LoadError::Batch {
            first_page: 11,
            last_page: 20,
            ..
        }
    ));

    // Partial rows stay exportable; the session is inactive but inspectable.
    assert_eq!(loader.records().await.len(), 30);
    let session = loader.session().await;
    assert!(!session.active);
    assert!(!session.is_complete);
    assert_eq!(session.loaded_records, 30);
}

#[tokio::test]
async fn server_last_page_flag_completes_before_total_pages() {
    let mut backend = ScriptedBackend::new(vec![2; 30]);
    backend.last_page_flag = Some(10);
    let backend = Arc::new(backend);
    let loader = Loader::new(backend.clone());

    let (tx, _rx) = mpsc::channel(1024);
    let outcome = loader.start_query(criteria(), tx).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Completed(_)));

    // The flag on page 10 ends the session after the first batch.
    assert_eq!(backend.pages_requested().iter().max(), Some(&10));
    let session = loader.session().await;
    assert!(session.is_complete);
    assert_eq!(session.loaded_records, 20);
}

#[tokio::test]
async fn end_to_end_summary_counts_by_record_type() {
    let mut backend = ScriptedBackend::new(vec![10, 10, 5]);
    backend.last_page_flag = Some(3);
    let loader = Loader::new(Arc::new(backend));

    let (tx, mut rx) = mpsc::channel(1024);
    let outcome = loader.start_query(criteria(), tx).await.unwrap();
    let summary = match outcome {
        LoadOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(summary.total_records, 25);
    // Pages 1..3 map to inbound/outbound/campaign in the scripted backend.
    assert_eq!(summary.by_record_type.get("inbound"), Some(&10));
    assert_eq!(summary.by_record_type.get("outbound"), Some(&10));
    assert_eq!(summary.by_record_type.get("campaign"), Some(&5));
    assert_eq!(summary.by_record_type.values().sum::<u64>(), 25);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        LoadEvent::Started {
            total_pages: 3,
            total_records: 25
        }
    )));

    let session = loader.session().await;
    assert!(session.is_complete);
    assert_eq!(session.loaded_records, 25);
}

#[tokio::test]
async fn empty_result_set_completes_immediately() {
    let loader = Loader::new(Arc::new(ScriptedBackend::new(Vec::new())));

    let (tx, mut rx) = mpsc::channel(64);
    let outcome = loader.start_query(criteria(), tx).await.unwrap();
    let summary = match outcome {
        LoadOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(summary.total_records, 0);

    let events = drain(&mut rx);
    assert_eq!(progress_count(&events), 0);
    assert!(loader.session().await.is_complete);
}

#[tokio::test(start_paused = true)]
async fn slow_init_emits_a_notice_before_the_query_starts() {
    let mut backend = ScriptedBackend::new(vec![1]);
    backend.init_delay = Duration::from_secs(7);
    let loader = Loader::new(Arc::new(backend));

    let (tx, mut rx) = mpsc::channel(64);
    loader.start_query(criteria(), tx).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(LoadEvent::SlowInit)));
    assert!(events
        .iter()
        .any(|e| matches!(e, LoadEvent::Started { .. })));
}
