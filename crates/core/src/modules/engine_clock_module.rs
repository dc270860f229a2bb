use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage, ModuleResult};
use crate::sequence::MemoryRegistry;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(23);

/// Drives the in-memory sequence engine: advances every sequence's clock at
/// a fixed rate so finite steps hand over on time.
pub struct EngineClockModule {
    registry: Arc<MemoryRegistry>,
    tick_interval: Duration,
    status: HashMap<String, String>,
}

impl EngineClockModule {
    pub fn new(registry: Arc<MemoryRegistry>) -> Self {
        Self {
            registry,
            tick_interval: DEFAULT_TICK_INTERVAL,
            status: HashMap::new(),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}

#[async_trait]
impl AsyncModule for EngineClockModule {
    fn id(&self) -> ModuleId {
        ModuleId::EngineClock
    }

    async fn initialize(&mut self) -> ModuleResult<()> {
        self.status.insert(
            "tick_interval_ms".to_string(),
            self.tick_interval.as_millis().to_string(),
        );
        self.status
            .insert("status".to_string(), "initialized".to_string());
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        _tx: mpsc::Sender<ModuleMessage>,
    ) -> ModuleResult<()> {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.registry.tick(Instant::now().into_std());
                }
                event = rx.recv() => match event {
                    Some(ModuleEvent::Shutdown) | None => break,
                    Some(_) => {}
                },
            }
        }

        log::debug!("Engine clock stopped");
        Ok(())
    }

    async fn shutdown(&mut self) -> ModuleResult<()> {
        self.status
            .insert("status".to_string(), "shutdown".to_string());
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}
