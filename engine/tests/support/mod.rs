//! Shared helpers for engine integration tests

use anyhow::Result;
use async_trait::async_trait;
use bus::EventHandler;
use common::{Event, EventPayload, MarketData, MarketDataPayload, RiskCheckReport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

/// Bus handler that records every event it sees.
pub struct EventRecorder {
    name: String,
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self { name: name.to_string(), events: Mutex::new(Vec::new()) })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn sequence_ids(&self) -> Vec<Option<u64>> {
        self.events.lock().iter().map(|event| event.sequence_id).collect()
    }

    pub fn risk_reports(&self) -> Vec<RiskCheckReport> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::RiskCheck(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for EventRecorder {
    async fn handle(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A quote record for `instrument` at the given mid.
pub fn quote(instrument: &str, mid: f64, source: &str) -> MarketData {
    MarketData::new(
        instrument,
        "SIM",
        MarketDataPayload::Quote { bid: mid - 0.5, ask: mid + 0.5, bid_size: None, ask_size: None },
        source,
    )
}
