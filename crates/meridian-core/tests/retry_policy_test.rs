//! Integration tests for the client retry policy
//!
//! A counting endpoint-manager double verifies the marking contract: exactly
//! one read or write mark per failed network attempt, never both, and none
//! at all for terminal decisions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use meridian_core::request::{DocumentRequest, OperationType, ResourceType};
use meridian_core::retry::{RETRY_INTERVAL, ServiceEndpoint};
use meridian_core::{ClientRetryPolicy, EndpointManager, Error, RetryDecision, RetryOptions};

#[derive(Default)]
struct MockEndpointManager {
    resolve_count: AtomicU32,
    read_marks: AtomicU32,
    write_marks: AtomicU32,
    refresh_count: AtomicU32,
    marked: Mutex<Vec<ServiceEndpoint>>,
}

#[async_trait]
impl EndpointManager for MockEndpointManager {
    fn resolve_service_endpoint(&self, _request: &DocumentRequest) -> ServiceEndpoint {
        self.resolve_count.fetch_add(1, Ordering::SeqCst);
        ServiceEndpoint::new("https://region-1.documents.example.com")
    }

    fn mark_endpoint_unavailable_for_read(&self, endpoint: &ServiceEndpoint) {
        self.read_marks.fetch_add(1, Ordering::SeqCst);
        self.marked.lock().push(endpoint.clone());
    }

    fn mark_endpoint_unavailable_for_write(&self, endpoint: &ServiceEndpoint) {
        self.write_marks.fetch_add(1, Ordering::SeqCst);
        self.marked.lock().push(endpoint.clone());
    }

    async fn refresh_locations(&self) {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn read_request() -> DocumentRequest {
    DocumentRequest::name_based(
        OperationType::Read,
        ResourceType::Document,
        "dbs/db1/colls/coll1/docs/doc1",
    )
}

fn write_request() -> DocumentRequest {
    DocumentRequest::name_based(
        OperationType::Create,
        ResourceType::Document,
        "dbs/db1/colls/coll1/docs/doc1",
    )
}

fn policy(manager: &Arc<MockEndpointManager>) -> ClientRetryPolicy {
    ClientRetryPolicy::new(
        Arc::clone(manager) as Arc<dyn EndpointManager>,
        true,
        RetryOptions::default(),
    )
}

#[tokio::test]
async fn test_read_network_failures_mark_read_endpoint_with_fixed_backoff() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&read_request());

    for attempt in 0..10u32 {
        let decision = policy.should_retry(Error::transport("connection reset")).await;
        assert!(decision.should_retry(), "attempt {attempt} must retry");
        assert_eq!(decision.backoff(), Some(RETRY_INTERVAL));
        assert_eq!(manager.read_marks.load(Ordering::SeqCst), attempt + 1);
        assert_eq!(manager.write_marks.load(Ordering::SeqCst), 0);
    }
    assert_eq!(manager.refresh_count.load(Ordering::SeqCst), 10);

    // every mark targeted the endpoint captured before the attempt
    let marked = manager.marked.lock();
    assert_eq!(marked.len(), 10);
    assert!(
        marked
            .iter()
            .all(|e| e.as_str() == "https://region-1.documents.example.com")
    );
}

#[tokio::test]
async fn test_write_network_failures_fail_fast_once_then_back_off() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&write_request());

    for attempt in 0..10u32 {
        let decision = policy.should_retry(Error::request_timeout("read timed out")).await;
        assert!(decision.should_retry(), "attempt {attempt} must retry");
        let expected = if attempt == 0 {
            Duration::ZERO
        } else {
            RETRY_INTERVAL
        };
        assert_eq!(decision.backoff(), Some(expected), "attempt {attempt}");
        assert_eq!(manager.write_marks.load(Ordering::SeqCst), attempt + 1);
        assert_eq!(manager.read_marks.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_single_write_region_skips_the_fast_probe() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = ClientRetryPolicy::new(
        Arc::clone(&manager) as Arc<dyn EndpointManager>,
        false,
        RetryOptions::default(),
    );
    policy.on_before_send_request(&write_request());

    let decision = policy.should_retry(Error::transport("connection reset")).await;
    assert_eq!(decision.backoff(), Some(RETRY_INTERVAL));
    assert_eq!(manager.write_marks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_should_retry_without_request_context_is_terminal() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);

    let decision = policy.should_retry(Error::transport("connection reset")).await;
    assert!(!decision.should_retry());
    assert_eq!(manager.resolve_count.load(Ordering::SeqCst), 0);
    assert_eq!(manager.read_marks.load(Ordering::SeqCst), 0);
    assert_eq!(manager.write_marks.load(Ordering::SeqCst), 0);
    assert_eq!(manager.refresh_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unclassified_errors_are_not_retried() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&read_request());

    let decision = policy
        .should_retry(Error::internal_server("protocol violation"))
        .await;
    match decision {
        RetryDecision::DontRetry { source } => {
            assert_eq!(source.status_code(), 500);
        }
        RetryDecision::Retry { .. } => panic!("unclassified errors must not retry"),
    }
    assert_eq!(manager.read_marks.load(Ordering::SeqCst), 0);
    assert_eq!(manager.write_marks.load(Ordering::SeqCst), 0);
    assert_eq!(manager.refresh_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_session_not_available_is_left_to_outer_policies() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&read_request());

    let decision = policy
        .should_retry(Error::session_not_available("replica behind"))
        .await;
    assert!(!decision.should_retry());
    match decision {
        RetryDecision::DontRetry { source } => {
            assert_eq!(source.status_code(), 404);
            assert_eq!(source.sub_status_code(), 1002);
        }
        RetryDecision::Retry { .. } => unreachable!(),
    }
    assert_eq!(manager.refresh_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_throttling_never_marks_endpoints() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&write_request());

    let decision = policy
        .should_retry(Error::throttled(Some(Duration::from_millis(25)), "429"))
        .await;
    assert_eq!(decision.backoff(), Some(Duration::from_millis(25)));
    assert_eq!(manager.read_marks.load(Ordering::SeqCst), 0);
    assert_eq!(manager.write_marks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_on_before_send_request_resets_the_network_counter() {
    let manager = Arc::new(MockEndpointManager::default());
    let mut policy = policy(&manager);
    policy.on_before_send_request(&write_request());

    // first failure: fast probe
    let decision = policy.should_retry(Error::transport("reset")).await;
    assert_eq!(decision.backoff(), Some(Duration::ZERO));

    // pipeline re-sends; a fresh capture resets the counter, so the next
    // first failure probes fast again
    policy.on_before_send_request(&write_request());
    let decision = policy.should_retry(Error::transport("reset")).await;
    assert_eq!(decision.backoff(), Some(Duration::ZERO));
}
