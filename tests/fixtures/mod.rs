//! Test fixtures shared by the integration test binaries

#![allow(dead_code)]

use anyhow::anyhow;
use pickup_room::error::Result;
use pickup_room::metrics::MetricsCollector;
use pickup_room::player::{InMemoryRegistrationStore, Registration};
use pickup_room::room::{Provisioner, TeardownSchedule};
use pickup_room::types::{EnqueueOutcome, RoomId};
use pickup_room::{
    InMemoryPlatform, PickupManager, PlayerRegistry, RegistrationStore, StaticGroupProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Teardown stage used by every fixture system
pub const STAGE: Duration = Duration::from_millis(10);

/// A manager wired to an in-memory platform
pub struct TestSystem {
    pub manager: PickupManager,
    pub platform: Arc<InMemoryPlatform>,
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with_store(Arc::new(InMemoryRegistrationStore::new()))
}

pub fn create_test_system_with_store(store: Arc<dyn RegistrationStore>) -> TestSystem {
    let platform = Arc::new(InMemoryPlatform::new());
    let provisioner = Arc::new(Provisioner::new(
        platform.clone(),
        Arc::new(StaticGroupProvider::new()),
        &Default::default(),
    ));
    let manager = PickupManager::new(
        Arc::new(PlayerRegistry::new(store)),
        provisioner,
        TeardownSchedule::new([STAGE; 3]),
        Arc::new(MetricsCollector::new().expect("metrics collector")),
    )
    .expect("pickup manager");

    TestSystem { manager, platform }
}

/// Friend code derived from a numeric player id
pub fn friend_code_for(player_id: &str) -> String {
    let digits = format!("{:0>12}", player_id);
    let tail = &digits[digits.len() - 12..];
    format!("{}-{}-{}", &tail[0..4], &tail[4..8], &tail[8..12])
}

/// Register `count` players with ids starting at `first`
pub async fn register_players(manager: &PickupManager, first: u64, count: u64) -> Vec<String> {
    let mut ids = Vec::new();
    for n in first..first + count {
        let id = n.to_string();
        manager
            .register(&id, &friend_code_for(&id))
            .await
            .expect("registration");
        ids.push(id);
    }
    ids
}

pub fn expect_room(outcome: EnqueueOutcome) -> RoomId {
    match outcome {
        EnqueueOutcome::RoomFormed { room_id } => room_id,
        other => panic!("expected a room to form, got {:?}", other),
    }
}

/// Store whose every call fails
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("disk unavailable"))
    }
}

impl RegistrationStore for FailingStore {
    fn exists(&self, _player_id: &str) -> Result<bool> {
        self.fail()
    }

    fn register(&self, _player_id: &str, _friend_code: &str) -> Result<()> {
        self.fail()
    }

    fn update_friend_code(&self, _player_id: &str, _friend_code: &str) -> Result<()> {
        self.fail()
    }

    fn get(&self, _player_id: &str) -> Result<Option<Registration>> {
        self.fail()
    }
}
