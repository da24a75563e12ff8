use parking_lot::Mutex;
use std::collections::VecDeque;

use super::models::TopUpEvent;

pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Bounded log of top-up outcomes, oldest evicted first.
pub struct EventLog {
    events: Mutex<VecDeque<TopUpEvent>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, event: TopUpEvent) {
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Snapshot of the retained events, newest last
    pub fn snapshot(&self) -> Vec<TopUpEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotopup::models::TopUpPolicy;

    fn event(n: usize) -> TopUpEvent {
        let policy = TopUpPolicy {
            enabled: true,
            trigger_threshold: 1,
            target_amount: 2,
        };
        TopUpEvent::start("pocket", &format!("app-{}", n), &policy)
    }

    #[test]
    fn test_evicts_oldest_first() {
        let log = EventLog::default();

        for n in 0..150 {
            log.push(event(n));
        }

        let events = log.snapshot();
        assert_eq!(events.len(), 100);
        assert_eq!(events.first().unwrap().address, "app-50");
        assert_eq!(events.last().unwrap().address, "app-149");
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let log = EventLog::new(3);
        log.push(event(0));

        let mut snapshot = log.snapshot();
        snapshot.clear();

        assert_eq!(log.snapshot().len(), 1);
    }

    #[test]
    fn test_under_capacity_keeps_order() {
        let log = EventLog::new(5);
        for n in 0..3 {
            log.push(event(n));
        }

        let addresses: Vec<_> = log.snapshot().into_iter().map(|e| e.address).collect();
        assert_eq!(addresses, vec!["app-0", "app-1", "app-2"]);
    }
}
