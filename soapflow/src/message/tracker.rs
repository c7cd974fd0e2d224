//! The per-message cursor over the handler chain.

use crate::engine::Handler;
use std::collections::VecDeque;
use std::sync::Arc;

/// Where a message is in its execution chain.
///
/// `current_handler_index` points into the top-level chain and starts at
/// -1 (not started). `current_phase_index` points into the phase being
/// run. Indices are advisory; the engine guards bounds.
#[derive(Debug, Clone)]
pub struct ExecutionTracker {
    execution_chain: Vec<Arc<dyn Handler>>,
    current_handler_index: i32,
    current_phase_index: i32,
    executed_phases: VecDeque<Arc<dyn Handler>>,
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self {
            execution_chain: Vec::new(),
            current_handler_index: -1,
            current_phase_index: 0,
            executed_phases: VecDeque::new(),
        }
    }
}

impl ExecutionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the chain and rewinds both indices.
    pub fn set_execution_chain(&mut self, chain: Vec<Arc<dyn Handler>>) {
        self.execution_chain = chain;
        self.current_handler_index = -1;
        self.current_phase_index = 0;
    }

    /// Appends units to the end of the chain.
    pub fn extend_execution_chain(&mut self, units: impl IntoIterator<Item = Arc<dyn Handler>>) {
        self.execution_chain.extend(units);
    }

    /// The chain.
    #[must_use]
    pub fn execution_chain(&self) -> &[Arc<dyn Handler>] {
        &self.execution_chain
    }

    /// The unit at `index`, if in bounds.
    #[must_use]
    pub fn handler_at(&self, index: i32) -> Option<Arc<dyn Handler>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.execution_chain.get(i))
            .cloned()
    }

    /// The top-level cursor.
    #[must_use]
    pub fn current_handler_index(&self) -> i32 {
        self.current_handler_index
    }

    /// Moves the top-level cursor.
    pub fn set_current_handler_index(&mut self, index: i32) {
        self.current_handler_index = index;
    }

    /// The cursor inside the current phase.
    #[must_use]
    pub fn current_phase_index(&self) -> i32 {
        self.current_phase_index
    }

    /// Moves the in-phase cursor.
    pub fn set_current_phase_index(&mut self, index: i32) {
        self.current_phase_index = index;
    }

    /// Records a unit as executed; it becomes the most recent.
    pub fn add_executed_phase(&mut self, unit: Arc<dyn Handler>) {
        self.executed_phases.push_front(unit);
    }

    /// Pops the most recently executed unit.
    pub fn remove_first_executed_phase(&mut self) -> Option<Arc<dyn Handler>> {
        self.executed_phases.pop_front()
    }

    /// Forgets every executed unit.
    pub fn reset_executed_phases(&mut self) {
        self.executed_phases.clear();
    }

    /// Executed units, most recent first.
    #[must_use]
    pub fn executed_phases(&self) -> Vec<Arc<dyn Handler>> {
        self.executed_phases.iter().cloned().collect()
    }

    /// Replaces the executed list. `units` is most recent first.
    pub fn set_executed_phases(&mut self, units: Vec<Arc<dyn Handler>>) {
        self.executed_phases = units.into();
    }
}

/// Expands phases into their handlers, depth first. Each phase is listed
/// before its handlers.
#[must_use]
pub fn flatten_handlers(units: &[Arc<dyn Handler>]) -> Vec<Arc<dyn Handler>> {
    let mut flat = Vec::new();
    for unit in units {
        flat.push(unit.clone());
        if let Some(phase) = unit.as_phase() {
            flat.extend(flatten_handlers(&phase.handlers()));
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Phase;
    use crate::testing::RecordingHandler;

    fn unit(name: &str) -> Arc<dyn Handler> {
        Arc::new(RecordingHandler::new(name))
    }

    #[test]
    fn test_new_tracker_is_unstarted() {
        let tracker = ExecutionTracker::new();
        assert_eq!(tracker.current_handler_index(), -1);
        assert_eq!(tracker.current_phase_index(), 0);
        assert!(tracker.handler_at(-1).is_none());
    }

    #[test]
    fn test_executed_phases_are_lifo() {
        let mut tracker = ExecutionTracker::new();
        tracker.add_executed_phase(unit("a"));
        tracker.add_executed_phase(unit("b"));

        assert_eq!(tracker.remove_first_executed_phase().unwrap().name(), "b");
        assert_eq!(tracker.executed_phases().len(), 1);

        tracker.reset_executed_phases();
        assert!(tracker.remove_first_executed_phase().is_none());
    }

    #[test]
    fn test_set_chain_rewinds() {
        let mut tracker = ExecutionTracker::new();
        tracker.set_current_handler_index(3);
        tracker.set_current_phase_index(2);
        tracker.set_execution_chain(vec![unit("a")]);

        assert_eq!(tracker.current_handler_index(), -1);
        assert_eq!(tracker.current_phase_index(), 0);
        assert_eq!(tracker.handler_at(0).unwrap().name(), "a");
    }

    #[test]
    fn test_flatten_expands_phases() {
        let phase: Arc<dyn Handler> = Arc::new(
            Phase::new("Security")
                .with_handler(unit("sign"))
                .with_handler(unit("encrypt")),
        );
        let names: Vec<String> = flatten_handlers(&[phase, unit("tail")])
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, ["Security", "sign", "encrypt", "tail"]);
    }
}
