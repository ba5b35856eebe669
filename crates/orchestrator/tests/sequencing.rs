use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::{BusError, EventStatus, MigrationPhase, ProgressEvent};
use fleet::{
    CapacityMutator, Collaborators, FleetConnector, FleetError, NodePoolInfo, PoolTarget,
    WorkloadEvacuator,
};
use orchestrator::{OrchestratorConfig, OrchestratorError, RunOutcome, SequencingOrchestrator};
use poolshift_core::{
    CapacitySpec, CoreError, EvacuationOptions, ExecutionId, MigrationRequest, PoolSpec,
};

/// In-memory cluster that records every collaborator call.
#[derive(Default)]
struct FakeCluster {
    hosts: Vec<String>,
    calls: Mutex<Vec<String>>,
    fail_capacity_for: Option<String>,
    /// 1-based host listing call that fails
    fail_list: Option<usize>,
    fail_cordon_on: Option<String>,
    fail_evict_on: Option<String>,
    incomplete: HashSet<String>,
    verify_errors: HashSet<String>,
}

impl FakeCluster {
    fn with_host_count(count: usize) -> Self {
        Self {
            hosts: (0..count).map(|i| format!("aks-a-{}", i)).collect(),
            ..Self::default()
        }
    }

    fn with_hosts(hosts: &[&str]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            ..Self::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn failure(what: &str) -> FleetError {
    FleetError::command_failed(what, "simulated failure")
}

#[async_trait]
impl CapacityMutator for FakeCluster {
    async fn apply_capacity(&self, target: &PoolTarget, spec: &CapacitySpec) -> fleet::Result<()> {
        self.record(format!(
            "capacity {}/{} {}",
            target.cluster_name,
            target.pool_name,
            spec.describe()
        ));
        if self.fail_capacity_for.as_deref() == Some(target.pool_name.as_str()) {
            return Err(failure("az aks nodepool scale"));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkloadEvacuator for FakeCluster {
    async fn list_hosts(&self, pool: &str) -> fleet::Result<Vec<String>> {
        self.record(format!("list {}", pool));
        let listings = self.calls().iter().filter(|c| c.starts_with("list ")).count();
        if self.fail_list == Some(listings) {
            return Err(failure("kubectl get nodes"));
        }
        Ok(self.hosts.clone())
    }

    async fn cordon(&self, host: &str) -> fleet::Result<()> {
        self.record(format!("cordon {}", host));
        if self.fail_cordon_on.as_deref() == Some(host) {
            return Err(failure("kubectl cordon"));
        }
        Ok(())
    }

    async fn evict(&self, host: &str, _options: &EvacuationOptions) -> fleet::Result<()> {
        self.record(format!("evict {}", host));
        if self.fail_evict_on.as_deref() == Some(host) {
            return Err(failure("kubectl drain"));
        }
        Ok(())
    }

    async fn is_fully_evacuated(&self, host: &str) -> fleet::Result<bool> {
        self.record(format!("verify {}", host));
        if self.verify_errors.contains(host) {
            return Err(failure("kubectl get pods"));
        }
        Ok(!self.incomplete.contains(host))
    }
}

struct FakeConnector {
    cluster: Arc<FakeCluster>,
    connects: Mutex<u32>,
    refuse: bool,
}

impl FakeConnector {
    fn new(cluster: FakeCluster) -> Arc<Self> {
        Arc::new(Self {
            cluster: Arc::new(cluster),
            connects: Mutex::new(0),
            refuse: false,
        })
    }

    fn refusing() -> Arc<Self> {
        Arc::new(Self {
            cluster: Arc::new(FakeCluster::default()),
            connects: Mutex::new(0),
            refuse: true,
        })
    }

    fn connects(&self) -> u32 {
        *self.connects.lock().unwrap()
    }
}

#[async_trait]
impl FleetConnector for FakeConnector {
    async fn connect(&self, cluster: &str) -> fleet::Result<Collaborators> {
        *self.connects.lock().unwrap() += 1;
        if self.refuse {
            return Err(FleetError::ClusterNotFound(cluster.to_string()));
        }
        Ok(Collaborators {
            cluster_name: cluster.trim_end_matches("-admin").to_string(),
            capacity: self.cluster.clone(),
            evacuator: self.cluster.clone(),
        })
    }

    async fn list_node_pools(&self, _cluster: &str) -> fleet::Result<Vec<NodePoolInfo>> {
        Ok(Vec::new())
    }
}

fn request() -> MigrationRequest {
    MigrationRequest {
        cluster_id: "aks-prod-admin".to_string(),
        pools: vec![
            PoolSpec::new("pool-a", "rg-prod", 1).with_post_migration(CapacitySpec::fixed(0)),
            PoolSpec::new("pool-b", "rg-prod", 2).with_pre_migration(CapacitySpec::autoscale(3, 6)),
        ],
        cordon_enabled: true,
        evacuation_enabled: true,
        evacuation_options: EvacuationOptions::default(),
    }
}

fn orchestrator(connector: Arc<FakeConnector>) -> SequencingOrchestrator {
    SequencingOrchestrator::new(connector, OrchestratorConfig::default())
}

/// Submit a request and collect every event until the stream closes.
async fn run_to_end(
    orchestrator: &SequencingOrchestrator,
    request: MigrationRequest,
) -> (Vec<ProgressEvent>, RunOutcome) {
    let handle = orchestrator.submit(request).await.unwrap();
    let mut source = orchestrator.bus().subscribe(handle.execution_id()).unwrap();

    let mut events = Vec::new();
    while let Some(event) = source.recv().await {
        events.push(event);
    }
    let outcome = handle.wait().await.unwrap();
    (events, outcome)
}

fn terminal_count(events: &[ProgressEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

fn assert_ordered(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].phase <= pair[1].phase,
            "phase went backwards: {:?} -> {:?}",
            pair[0].message,
            pair[1].message
        );
        assert!(
            pair[0].progress_percent <= pair[1].progress_percent,
            "progress went backwards: {:?} -> {:?}",
            pair[0].message,
            pair[1].message
        );
    }
}

fn host_events(events: &[ProgressEvent], phase: MigrationPhase) -> Vec<&ProgressEvent> {
    events
        .iter()
        .filter(|e| e.phase_name == phase && e.host_name.is_some())
        .collect()
}

mod happy_path {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_runs_all_phases_in_order() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0", "aks-a-1"]));
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        match outcome {
            RunOutcome::Completed { duration } => assert!(duration >= Duration::from_secs(30)),
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(
            connector.cluster.calls(),
            vec![
                "capacity aks-prod/pool-b autoscaling 3..6",
                "list pool-a",
                "cordon aks-a-0",
                "cordon aks-a-1",
                "list pool-a",
                "evict aks-a-0",
                "verify aks-a-0",
                "evict aks-a-1",
                "verify aks-a-1",
                "capacity aks-prod/pool-a 0 nodes (autoscaling off)",
            ]
        );

        assert_ordered(&events);
        assert_eq!(terminal_count(&events), 1);
        assert!(events.iter().all(|e| e.status != EventStatus::Error));

        let last = events.last().unwrap();
        assert_eq!(last.phase_name, MigrationPhase::Finalize);
        assert_eq!(last.status, EventStatus::Completed);
        assert_eq!(last.progress_percent, 100.0);
        assert!(last.message.starts_with("Sequencing completed successfully in 30"));

        let phases: HashSet<u8> = events.iter().map(|e| e.phase).collect();
        assert_eq!(phases, HashSet::from([1, 2, 3, 4, 5]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_evicted_after_completion() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector);

        let handle = orchestrator.submit(request()).await.unwrap();
        let id = handle.execution_id().clone();
        assert!(orchestrator.bus().contains(&id));
        assert!(id.as_str().starts_with("aks-prod-admin_"));

        handle.wait().await.unwrap();
        assert!(!orchestrator.bus().contains(&id));
        assert!(matches!(
            orchestrator.bus().subscribe(&id),
            Err(BusError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_event_per_host_in_enumeration_order() {
        let hosts = ["aks-a-2", "aks-a-0", "aks-a-1"];
        let connector = FakeConnector::new(FakeCluster::with_hosts(&hosts));
        let orchestrator = orchestrator(connector);

        let (events, _) = run_to_end(&orchestrator, request()).await;

        for phase in [MigrationPhase::Cordon, MigrationPhase::Evacuate] {
            let per_host = host_events(&events, phase);
            let names: Vec<&str> = per_host
                .iter()
                .map(|e| e.host_name.as_deref().unwrap())
                .collect();
            assert_eq!(names, hosts);

            let indexes: Vec<u32> = per_host.iter().map(|e| e.host_index.unwrap()).collect();
            assert_eq!(indexes, vec![1, 2, 3]);
            assert!(per_host.iter().all(|e| e.host_total == Some(3)));
        }

        let cordoned = host_events(&events, MigrationPhase::Cordon);
        assert_eq!(cordoned.last().unwrap().progress_percent, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pool_emits_no_host_events() {
        let connector = FakeConnector::new(FakeCluster::default());
        let orchestrator = orchestrator(connector);

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(outcome.is_completed());
        assert!(events.iter().all(|e| e.host_name.is_none()));
        assert_ordered(&events);
    }
}

mod skipping {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_missing_capacity_changes_are_skipped() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector.clone());

        let mut req = request();
        for pool in &mut req.pools {
            pool.pre_migration_capacity = None;
            pool.post_migration_capacity = None;
        }

        let (events, outcome) = run_to_end(&orchestrator, req).await;
        assert!(outcome.is_completed());

        let pre_done = events
            .iter()
            .find(|e| {
                e.phase_name == MigrationPhase::PreMigrate && e.status == EventStatus::Completed
            })
            .unwrap();
        assert!(pre_done.message.contains("skipped"));

        let post_done = events
            .iter()
            .find(|e| {
                e.phase_name == MigrationPhase::PostMigrate && e.status == EventStatus::Completed
            })
            .unwrap();
        assert!(post_done.message.contains("skipped"));

        assert!(connector
            .cluster
            .calls()
            .iter()
            .all(|c| !c.starts_with("capacity")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cordon_and_drain_touch_no_hosts() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector.clone());

        let mut req = request();
        req.cordon_enabled = false;
        req.evacuation_enabled = false;

        let (events, outcome) = run_to_end(&orchestrator, req).await;
        assert!(outcome.is_completed());
        assert_ordered(&events);

        let calls = connector.cluster.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.starts_with("capacity")));

        let cordon: Vec<_> = events
            .iter()
            .filter(|e| e.phase_name == MigrationPhase::Cordon)
            .collect();
        assert_eq!(cordon.len(), 1);
        assert_eq!(cordon[0].status, EventStatus::Completed);
        assert_eq!(cordon[0].message, "CORDON phase skipped (disabled)");
        assert_eq!(cordon[0].progress_percent, 40.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cordon_only_run() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector.clone());

        let mut req = request();
        req.evacuation_enabled = false;

        let (_, outcome) = run_to_end(&orchestrator, req).await;
        assert!(outcome.is_completed());

        let calls = connector.cluster.calls();
        assert!(calls.contains(&"cordon aks-a-0".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("evict")));
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn test_drain_without_cordon_rejected_before_session() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector.clone());

        let mut req = request();
        req.cordon_enabled = false;

        let err = orchestrator.submit(req).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Validation(CoreError::DrainRequiresCordon)
        ));
        assert!(orchestrator.bus().is_empty());
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_wrong_pool_count_rejected() {
        let connector = FakeConnector::new(FakeCluster::default());
        let orchestrator = orchestrator(connector);

        let mut req = request();
        req.pools.truncate(1);

        let err = orchestrator.submit(req).await.unwrap_err();
        assert!(err.is_validation());
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_creates_no_session() {
        let connector = FakeConnector::refusing();
        let orchestrator = orchestrator(connector.clone());

        let err = orchestrator.submit(request()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Fleet(FleetError::ClusterNotFound(_))
        ));
        assert_eq!(connector.connects(), 1);
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let connector = FakeConnector::new(FakeCluster::default());
        let orchestrator = orchestrator(connector);

        let err = orchestrator
            .bus()
            .subscribe(&ExecutionId::from("aks-prod_42"))
            .unwrap_err();
        assert!(matches!(err, BusError::NotFound(_)));
    }
}

mod failures {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cordon_failure_stops_run() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0", "aks-a-1", "aks-a-2"]);
        cluster.fail_cordon_on = Some("aks-a-1".to_string());
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        match outcome {
            RunOutcome::Failed { phase, host, error } => {
                assert_eq!(phase, MigrationPhase::Cordon);
                assert_eq!(host.as_deref(), Some("aks-a-1"));
                assert!(error.contains("simulated failure"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let cordon_hosts = host_events(&events, MigrationPhase::Cordon);
        assert_eq!(cordon_hosts.len(), 2);
        assert_eq!(cordon_hosts[0].host_name.as_deref(), Some("aks-a-0"));
        assert_eq!(cordon_hosts[0].status, EventStatus::Running);

        let last = events.last().unwrap();
        assert_eq!(last.status, EventStatus::Error);
        assert_eq!(last.phase_name, MigrationPhase::Cordon);
        assert_eq!(last.host_name.as_deref(), Some("aks-a-1"));
        assert_eq!(last.host_index, Some(2));
        assert!(last.error.as_deref().unwrap().contains("simulated failure"));

        assert_eq!(terminal_count(&events), 1);
        assert_ordered(&events);
        assert!(!events.iter().any(|e| {
            e.phase_name == MigrationPhase::Cordon && e.status == EventStatus::Completed
        }));
        assert!(events.iter().all(|e| e.phase <= 2));

        // Already cordoned hosts stay cordoned and the third is never touched.
        let calls = connector.cluster.calls();
        assert!(calls.contains(&"cordon aks-a-0".to_string()));
        assert!(!calls.contains(&"cordon aks-a-2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_migration_failure_skips_everything_else() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0"]);
        cluster.fail_capacity_for = Some("pool-b".to_string());
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                phase: MigrationPhase::PreMigrate,
                host: None,
                ..
            }
        ));
        assert_eq!(connector.cluster.calls().len(), 1);
        assert!(events.iter().all(|e| e.phase == 1));
        assert_eq!(events.last().unwrap().status, EventStatus::Error);
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_failure_is_fatal() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0", "aks-a-1"]);
        cluster.fail_evict_on = Some("aks-a-0".to_string());
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                phase: MigrationPhase::Evacuate,
                ..
            }
        ));
        assert!(host_events(&events, MigrationPhase::Evacuate)
            .iter()
            .all(|e| e.status == EventStatus::Error));
        assert!(!connector
            .cluster
            .calls()
            .iter()
            .any(|c| c.starts_with("capacity aks-prod/pool-a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_verification_problems_are_warnings() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0", "aks-a-1", "aks-a-2"]);
        cluster.incomplete.insert("aks-a-0".to_string());
        cluster.verify_errors.insert("aks-a-1".to_string());
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector);

        let (events, outcome) = run_to_end(&orchestrator, request()).await;
        assert!(outcome.is_completed());

        let drained = host_events(&events, MigrationPhase::Evacuate);
        assert_eq!(drained.len(), 3);
        assert!(drained.iter().all(|e| e.status == EventStatus::Running));
        assert!(drained[0].message.starts_with("Warning: node aks-a-0 still has workloads"));
        assert!(drained[1].message.starts_with("Warning: could not verify drain of node aks-a-1"));
        assert_eq!(drained[2].message, "Node aks-a-2 fully drained");
        assert_eq!(drained[2].progress_percent, 75.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_listing_failure_during_cordon() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0", "aks-a-1"]);
        cluster.fail_list = Some(1);
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                phase: MigrationPhase::Cordon,
                host: None,
                ..
            }
        ));

        let errors: Vec<_> = events
            .iter()
            .filter(|e| e.status == EventStatus::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase_name, MigrationPhase::Cordon);
        assert!(errors[0].host_name.is_none());
        assert!(events.iter().all(|e| e.host_name.is_none()));
        assert_eq!(terminal_count(&events), 1);
        assert_ordered(&events);

        assert!(!connector.cluster.calls().iter().any(|c| c.starts_with("cordon ")));
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_listing_failure_during_evacuate() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0", "aks-a-1"]);
        cluster.fail_list = Some(2);
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                phase: MigrationPhase::Evacuate,
                host: None,
                ..
            }
        ));

        assert_eq!(host_events(&events, MigrationPhase::Cordon).len(), 2);
        assert!(host_events(&events, MigrationPhase::Evacuate).is_empty());

        let last = events.last().unwrap();
        assert_eq!(last.status, EventStatus::Error);
        assert_eq!(last.phase_name, MigrationPhase::Evacuate);
        assert_eq!(terminal_count(&events), 1);
        assert_ordered(&events);

        assert!(!connector.cluster.calls().iter().any(|c| c.starts_with("evict ")));
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_migration_failure_skips_finalize() {
        let mut cluster = FakeCluster::with_hosts(&["aks-a-0"]);
        cluster.fail_capacity_for = Some("pool-a".to_string());
        let connector = FakeConnector::new(cluster);
        let orchestrator = orchestrator(connector.clone());

        let (events, outcome) = run_to_end(&orchestrator, request()).await;

        assert!(matches!(
            outcome,
            RunOutcome::Failed {
                phase: MigrationPhase::PostMigrate,
                host: None,
                ..
            }
        ));

        let last = events.last().unwrap();
        assert_eq!(last.status, EventStatus::Error);
        assert_eq!(last.phase_name, MigrationPhase::PostMigrate);
        assert!(last.error.as_deref().unwrap().contains("simulated failure"));
        assert_eq!(last.progress_percent, 80.0);

        assert!(events.iter().all(|e| e.phase_name != MigrationPhase::Finalize));
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(
            connector.cluster.calls().last().map(String::as_str),
            Some("capacity aks-prod/pool-a 0 nodes (autoscaling off)")
        );
    }
}

mod supervision {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_large_unobserved_run_is_not_throttled() {
        let connector = FakeConnector::new(FakeCluster::with_host_count(60));
        let orchestrator = orchestrator(connector.clone());

        let started = tokio::time::Instant::now();
        let handle = orchestrator.submit(request()).await.unwrap();
        assert!(handle.wait().await.unwrap().is_completed());

        assert!(started.elapsed() < Duration::from_secs(31));
        assert_eq!(
            connector
                .cluster
                .calls()
                .iter()
                .filter(|c| c.starts_with("evict "))
                .count(),
            60
        );
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_reader_still_receives_final_event() {
        let connector = FakeConnector::new(FakeCluster::with_host_count(60));
        let orchestrator = orchestrator(connector);

        let handle = orchestrator.submit(request()).await.unwrap();
        let mut source = orchestrator.bus().subscribe(handle.execution_id()).unwrap();

        // Nothing is read until the run is over, so the queue overflows.
        assert!(handle.wait().await.unwrap().is_completed());

        let mut received = Vec::new();
        while let Some(event) = source.recv().await {
            received.push(event);
        }

        assert_eq!(received.len(), events::DEFAULT_CAPACITY + 1);
        assert_eq!(terminal_count(&received), 1);
        assert_ordered(&received);

        let last = received.last().unwrap();
        assert_eq!(last.phase_name, MigrationPhase::Finalize);
        assert_eq!(last.status, EventStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_disconnect_does_not_cancel_run() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0", "aks-a-1"]));
        let orchestrator = orchestrator(connector.clone());

        let handle = orchestrator.submit(request()).await.unwrap();
        let mut source = orchestrator.bus().subscribe(handle.execution_id()).unwrap();
        source.recv().await.unwrap();
        drop(source);

        let outcome = handle.wait().await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(connector.cluster.calls().len(), 10);
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_run_completes() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector);

        let handle = orchestrator.submit(request()).await.unwrap();
        assert!(handle.wait().await.unwrap().is_completed());
        assert!(orchestrator.bus().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_subscriber_rejected() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector);

        let handle = orchestrator.submit(request()).await.unwrap();
        let _source = orchestrator.bus().subscribe(handle.execution_id()).unwrap();
        assert!(matches!(
            orchestrator.bus().subscribe(handle.execution_id()),
            Err(BusError::AlreadySubscribed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_waiting_run() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector.clone());

        let handle = orchestrator.submit(request()).await.unwrap();
        let mut source = orchestrator.bus().subscribe(handle.execution_id()).unwrap();
        loop {
            let event = source.recv().await.unwrap();
            if event.message.starts_with("Waiting") {
                break;
            }
        }

        orchestrator.shutdown().await;

        let mut rest = Vec::new();
        while let Some(event) = source.recv().await {
            rest.push(event);
        }
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].status, EventStatus::Error);
        assert_eq!(
            rest[0].error.as_deref(),
            Some("cancelled: service shutting down")
        );

        assert_eq!(
            handle.wait().await.unwrap(),
            RunOutcome::Cancelled {
                phase: MigrationPhase::PreMigrate
            }
        );
        assert!(!connector.cluster.calls().iter().any(|c| c.starts_with("cordon")));
        assert_eq!(orchestrator.active_runs(), 0);

        let err = orchestrator.submit(request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_are_independent() {
        let connector = FakeConnector::new(FakeCluster::with_hosts(&["aks-a-0"]));
        let orchestrator = orchestrator(connector);

        let first = orchestrator.submit(request()).await.unwrap();
        let second = orchestrator.submit(request()).await.unwrap();
        assert_ne!(first.execution_id(), second.execution_id());
        assert_eq!(orchestrator.bus().len(), 2);

        let (a, b) = futures::join!(first.wait(), second.wait());
        assert!(a.unwrap().is_completed());
        assert!(b.unwrap().is_completed());
        assert!(orchestrator.bus().is_empty());
    }
}
