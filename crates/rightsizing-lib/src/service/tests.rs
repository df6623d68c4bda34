use super::*;
use crate::aggregation::{AggregationEngine, EngineConfig};
use crate::cache::SharedCache;
use crate::health::{components, ComponentStatus};
use crate::jobs::{
    DedupConfig, JobDeduplicator, JobState, LocalTaskQueue, PodForecastTask, QueueConfig,
    VmForecastTask, FORECAST_POD_TASK, FORECAST_VM_TASK,
};
use crate::models::{QueryWindow, CPU, MEMORY};
use crate::status::HealthStatus;
use crate::summary::{ClusterSummaryCache, SummaryConfig};
use crate::testing::{
    container_series, quota_row, vm_series, FakeGateway, FakeMetricSource, FakeQuotaSource,
};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    pods: PodService,
    vms: VmService,
    health: HealthRegistry,
    queue: Arc<LocalTaskQueue>,
    gateway: Arc<FakeGateway>,
    cache: SharedCache,
}

async fn fixture(gateway: FakeGateway) -> Fixture {
    let long: Vec<f64> = (0..120).map(|i| if i % 2 == 0 { 0.9 } else { 1.0 }).collect();
    let metrics = FakeMetricSource::default()
        .with_series(
            CPU,
            vec![
                container_series(1, "ns", "a", "c1", &long),
                container_series(2, "ns", "a", "c2", &[0.5]),
            ],
        )
        .with_series(
            MEMORY,
            vec![
                vm_series(3, "web", &long),
                vm_series(4, "db1", &[1.0]),
                vm_series(5, "db1", &[2.0]),
            ],
        );
    let quota = FakeQuotaSource {
        requests: vec![quota_row("ns", "a", "c1", CPU, 1.0)],
        limits: vec![quota_row("ns", "a", "c1", CPU, 2.0)],
        ..Default::default()
    };
    let gateway: Arc<FakeGateway> = Arc::new(gateway);
    let engine = Arc::new(AggregationEngine::new(
        Arc::new(metrics),
        Arc::new(quota),
        gateway.clone(),
        EngineConfig::default(),
    ));

    let queue = Arc::new(
        LocalTaskQueue::new(QueueConfig {
            retry_delay: Duration::ZERO,
            ..Default::default()
        })
        .register(
            FORECAST_POD_TASK,
            Arc::new(PodForecastTask::new(engine.clone(), gateway.clone())),
        )
        .register(
            FORECAST_VM_TASK,
            Arc::new(VmForecastTask::new(engine.clone(), gateway.clone())),
        ),
    );
    queue.start();

    let health = HealthRegistry::new();
    health.register_all().await;
    let cache = SharedCache::new(Duration::from_secs(600));
    let jobs = Arc::new(JobDeduplicator::new(
        queue.clone(),
        cache.clone(),
        DedupConfig::default(),
    ));
    let summary = Arc::new(ClusterSummaryCache::new(
        engine.clone(),
        cache.clone(),
        SummaryConfig::default(),
    ));

    Fixture {
        pods: PodService::new(engine.clone(), summary, jobs.clone(), health.clone()),
        vms: VmService::new(engine, jobs, health.clone()),
        health,
        queue,
        gateway,
        cache,
    }
}

#[tokio::test]
async fn test_get_pod_rightsizes_and_annotates() {
    let f = fixture(FakeGateway::default()).await;

    let pod = f.pods.get_pod(&QueryWindow::last_days(7), "ns", "a").await.unwrap();

    let c1 = pod.containers.iter().find(|c| c.name == "c1").unwrap();
    assert_eq!(c1.usages[CPU].optimized_usage(), 1.0);
    assert_eq!(c1.usages[CPU].status, Some(HealthStatus::Healthy));

    let c2 = pod.containers.iter().find(|c| c.name == "c2").unwrap();
    assert_eq!(c2.usages[CPU].optimized_usage(), 0.0);
    assert_eq!(c2.usages[CPU].status, Some(HealthStatus::Unknown));

    assert_eq!(pod.usages[CPU].optimized_usage(), 1.0);
    assert_eq!(pod.usages[CPU].request, 1.0);
}

#[tokio::test]
async fn test_gateway_failure_degrades_inference() {
    let f = fixture(FakeGateway::failing()).await;

    let err = f.pods.get_all_pods(&QueryWindow::last_days(7)).await.unwrap_err();
    assert!(err.is_retryable());

    let health = f.health.health().await;
    assert_eq!(
        health.components[components::INFERENCE].status,
        ComponentStatus::Degraded
    );
}

async fn inference_status(health: &HealthRegistry) -> ComponentStatus {
    health.health().await.components[components::INFERENCE].status
}

#[tokio::test]
async fn test_inference_recovers_after_successful_call() {
    let f = fixture(FakeGateway::failing()).await;
    let window = QueryWindow::last_days(7);

    f.pods.get_pod(&window, "ns", "a").await.unwrap_err();
    assert_eq!(inference_status(&f.health).await, ComponentStatus::Degraded);

    f.gateway.set_failing(false);
    f.pods.get_pod(&window, "ns", "a").await.unwrap();

    assert_eq!(inference_status(&f.health).await, ComponentStatus::Healthy);
    assert_eq!(f.health.health().await.status, ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_lookup_failure_leaves_health_alone() {
    let f = fixture(FakeGateway::default()).await;

    let err = f.vms.get_vm(&QueryWindow::last_days(7), "db1").await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(f.health.health().await.status, ComponentStatus::Healthy);
}

#[tokio::test]
async fn test_vm_lookup() {
    let f = fixture(FakeGateway::default()).await;
    let window = QueryWindow::last_days(7);

    let vm = f.vms.get_vm(&window, "web").await.unwrap();
    assert_eq!(vm.usages[MEMORY].optimized_usage(), 1.0);
    assert_eq!(vm.usages[MEMORY].status, Some(HealthStatus::Unknown));

    let err = f.vms.get_vm(&window, "db1").await.unwrap_err();
    assert!(matches!(err, crate::error::RightsizingError::NotUnique { .. }));
}

async fn wait_success(pods: &PodService, job_id: &str) {
    for _ in 0..200 {
        if pods.forecast_status_by_id(job_id).await.unwrap() == JobState::Success {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("forecast {} did not succeed", job_id);
}

#[tokio::test]
async fn test_pod_forecast_end_to_end() {
    let f = fixture(FakeGateway::default()).await;
    let window = QueryWindow::last_days(7);

    let id = f.pods.forecast(&window, "ns", "a").await.unwrap();
    assert_eq!(f.pods.forecast(&window, "ns", "a").await.unwrap(), id);

    wait_success(&f.pods, &id).await;
    assert_eq!(f.pods.forecast_status("ns", "a").await.unwrap(), JobState::Success);

    let by_key = f.pods.forecast_result("ns", "a").await.unwrap().unwrap();
    let by_id = f.pods.forecast_result_by_id(&id).await.unwrap().unwrap();
    assert_eq!(by_key, by_id);
    assert_eq!(by_key.keys().collect::<Vec<_>>(), vec!["c1", "c2"]);
    assert!(by_key["c1"].usage[CPU].contains_key("yhat"));
    f.queue.shutdown();
}

#[tokio::test]
async fn test_vm_forecast_by_name() {
    let f = fixture(FakeGateway::default()).await;
    let window = QueryWindow::last_days(7);

    let id = f.vms.forecast(&window, "web").await.unwrap();
    wait_success(&f.pods, &id).await;

    let result = f.vms.forecast_result("web").await.unwrap().unwrap();
    assert!(result["web"].usage[MEMORY].contains_key("yhat_lower"));
    assert_eq!(f.vms.forecast_status_by_id(&id).await.unwrap(), JobState::Success);
}

#[tokio::test]
async fn test_forecast_lookups_without_job() {
    let f = fixture(FakeGateway::default()).await;

    assert!(f.pods.forecast_status("ns", "a").await.unwrap_err().is_not_found());
    assert!(f.vms.forecast_result("web").await.unwrap_err().is_not_found());
    assert!(f.pods.forecast_status_by_id("missing").await.unwrap_err().is_not_found());
    assert!(matches!(
        f.pods.forecast_status("", "a").await.unwrap_err(),
        crate::error::RightsizingError::Validation(_)
    ));
}

#[tokio::test]
async fn test_cluster_info_and_quota_view() {
    let f = fixture(FakeGateway::default()).await;

    let summary = f.pods.cluster_info().await.unwrap();
    assert_eq!(summary.pods, 1);
    // 0.9/1.0 alternating ends on 1.0 in c1 plus 0.5 in c2: 1.5 against request 1
    assert_eq!(summary.resources[CPU].overallocated, 1);

    let quota = f.pods.get_all_pod_quota().await.unwrap();
    assert_eq!(quota[0].usages[CPU].limit, 2.0);
}

#[tokio::test]
async fn test_summary_and_forecast_keys_share_one_cache() {
    let f = fixture(FakeGateway::default()).await;
    let window = QueryWindow::last_days(7);

    f.pods.cluster_info().await.unwrap();
    f.pods.forecast(&window, "ns", "a").await.unwrap();
    f.vms.forecast(&window, "web").await.unwrap();

    assert_eq!(f.cache.len(), 3);
    assert!(f.cache.get("pod:ns-a").is_some());
    assert_eq!(f.cache.purge_expired(), 0);
    f.queue.shutdown();
}
