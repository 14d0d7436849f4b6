use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{Clock, ItemCatalog};
use crate::domain::{Item, ROUND_COUNT};
use crate::use_cases::registry::{SessionHandle, SessionRegistry, SessionSettings};

pub(crate) const TEST_UNIT_MS: u64 = 1000;

// Manually advanced time source so round math is deterministic in tests.
pub(crate) struct ManualClock(AtomicU64);

impl ManualClock {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub(crate) fn advance_units(&self, units: u64) {
        self.0.fetch_add(units * TEST_UNIT_MS, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// Catalog that always returns the first `count` of its items.
pub(crate) struct FixedCatalog {
    pub(crate) items: Vec<Item>,
}

impl FixedCatalog {
    pub(crate) fn with_hints(hints_per_item: usize) -> Self {
        let items = (0..ROUND_COUNT)
            .map(|i| Item {
                id: format!("item-{i}"),
                image_path: format!("/flags/item-{i}.png"),
                hints: (0..hints_per_item).map(|h| format!("hint {i}.{h}")).collect(),
            })
            .collect();
        Self { items }
    }
}

#[async_trait]
impl ItemCatalog for FixedCatalog {
    async fn draw(&self, count: usize, _seed: u64) -> Result<Vec<Item>, String> {
        if self.items.len() < count {
            return Err("not enough items".to_string());
        }
        Ok(self.items[..count].to_vec())
    }
}

pub(crate) fn test_settings() -> SessionSettings {
    SessionSettings {
        command_channel_capacity: 64,
        event_broadcast_capacity: 64,
        tick_interval: Duration::from_millis(5),
        time_unit_ms: TEST_UNIT_MS,
        round_duration: 25,
        round_count: ROUND_COUNT,
        retention: Duration::from_millis(50),
    }
}

pub(crate) fn test_registry_with(
    clock: Arc<dyn Clock>,
    catalog: FixedCatalog,
    settings: SessionSettings,
) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        settings,
        clock,
        Arc::new(catalog),
        Arc::new(|_: &SessionHandle| {}),
    ))
}

pub(crate) fn test_registry(clock: Arc<ManualClock>) -> Arc<SessionRegistry> {
    test_registry_with(clock, FixedCatalog::with_hints(4), test_settings())
}
