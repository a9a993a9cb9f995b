// Ladder state carried between reconciler invocations

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LadderError, LadderResult};

/// A buy order the reconciler believes is resting at a ladder level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedOrder {
    pub order_id: String,
    pub price: f64,
    pub size: f64,
    pub level: usize,
}

/// Everything the reconciler remembers between passes.
///
/// The exchange is the source of truth; this is a cache that detection and
/// reconciliation re-synchronise. Callers own it and may serialize it between
/// invocations. `slots` is keyed by level, so a level holds at most one order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderState {
    pub enabled: bool,
    #[serde(default)]
    slots: BTreeMap<usize, TrackedOrder>,
    /// Orders pushed out of their slot by a newer order at the same level.
    /// Their fill has not been observed yet, so fill monitoring still checks them.
    #[serde(default)]
    displaced: Vec<TrackedOrder>,
}

impl LadderState {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, ..Self::default() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn tracked(&self, level: usize) -> Option<&TrackedOrder> {
        self.slots.get(&level)
    }

    pub fn tracked_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
        self.slots.values()
    }

    pub fn tracked_len(&self) -> usize {
        self.slots.len()
    }

    pub fn tracked_levels(&self) -> Vec<usize> {
        self.slots.keys().copied().collect()
    }

    pub fn displaced_orders(&self) -> &[TrackedOrder] {
        &self.displaced
    }

    pub fn is_tracking(&self, order_id: &str) -> bool {
        self.slots.values().any(|o| o.order_id == order_id)
            || self.displaced.iter().any(|o| o.order_id == order_id)
    }

    /// Put `order` in its level's slot. A different order already in the slot
    /// is kept for fill monitoring and returned.
    pub fn occupy(&mut self, order: TrackedOrder) -> Option<TrackedOrder> {
        self.displaced.retain(|o| o.order_id != order.order_id);
        match self.slots.insert(order.level, order) {
            Some(previous) if !self.is_tracking(&previous.order_id) => {
                self.displaced.push(previous.clone());
                Some(previous)
            }
            _ => None,
        }
    }

    /// Every order awaiting a fill decision: slot holders first, then displaced ones
    pub fn orders_to_check(&self) -> Vec<TrackedOrder> {
        self.slots
            .values()
            .chain(self.displaced.iter())
            .cloned()
            .collect()
    }

    /// Forget an order wherever it is held
    pub fn release(&mut self, order_id: &str) -> Option<TrackedOrder> {
        let level = self
            .slots
            .iter()
            .find(|(_, o)| o.order_id == order_id)
            .map(|(level, _)| *level);

        if let Some(level) = level {
            return self.slots.remove(&level);
        }

        let idx = self.displaced.iter().position(|o| o.order_id == order_id)?;
        Some(self.displaced.remove(idx))
    }

    pub fn clear_tracked(&mut self) {
        self.slots.clear();
        self.displaced.clear();
    }

    /// Load state saved by a previous invocation
    pub fn from_file<P: AsRef<Path>>(path: P) -> LadderResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| LadderError::FileRead(format!("{}: {}", path.display(), e)))?;

        serde_json::from_str(&content)
            .map_err(|e| LadderError::FileRead(format!("{}: {}", path.display(), e)))
    }

    /// Save state for the next invocation
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> LadderResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        fs::write(path, content)
            .map_err(|e| LadderError::FileWrite(format!("{}: {}", path.display(), e)))
    }

    /// Saved state if the file exists, otherwise a fresh disabled state
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> LadderResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No saved state at {}, starting fresh", path.display());
            return Ok(Self::default());
        }

        let state = Self::from_file(path)?;
        info!(
            "💾 Restored state from {}: {} tracked, {} displaced",
            path.display(),
            state.tracked_len(),
            state.displaced.len()
        );
        Ok(state)
    }
}
