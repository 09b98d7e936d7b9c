use std::ops::BitOr;

use crate::State;

/// The points of a run handlers can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    EpochStarted,
    IterationStarted,
    IterationCompleted,
    EpochCompleted,
    Completed,
    Terminate,
}

impl Event {
    /// Fires on every `n`th occurrence.
    pub fn every(self, n: usize) -> EventFilter {
        EventFilter {
            event: self,
            filter: Filter::Every(n.max(1)),
        }
    }

    /// Fires on the `n`th occurrence only.
    pub fn once(self, n: usize) -> EventFilter {
        EventFilter {
            event: self,
            filter: Filter::Once(n),
        }
    }

    /// The occurrence counter of this event, iteration events count
    /// iterations and epoch events count epochs.
    fn count(&self, state: &State) -> usize {
        match self {
            Event::IterationStarted | Event::IterationCompleted => state.iteration,
            Event::EpochStarted | Event::EpochCompleted => state.epoch,
            Event::Started | Event::Completed | Event::Terminate => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Every(usize),
    Once(usize),
}

/// An event with an occurrence filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    event: Event,
    filter: Filter,
}

impl EventFilter {
    pub fn matches(&self, event: Event, state: &State) -> bool {
        if event != self.event {
            return false;
        }

        let count = event.count(state);
        match self.filter {
            Filter::Every(n) => count % n == 0,
            Filter::Once(n) => count == n,
        }
    }
}

impl From<Event> for EventFilter {
    fn from(event: Event) -> Self {
        event.every(1)
    }
}

/// A union of filtered events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSet(Vec<EventFilter>);

impl EventSet {
    pub fn matches(&self, event: Event, state: &State) -> bool {
        self.0.iter().any(|filter| filter.matches(event, state))
    }
}

impl From<Event> for EventSet {
    fn from(event: Event) -> Self {
        Self(vec![event.into()])
    }
}

impl From<EventFilter> for EventSet {
    fn from(filter: EventFilter) -> Self {
        Self(vec![filter])
    }
}

impl<T: Into<EventSet>> BitOr<T> for EventSet {
    type Output = EventSet;

    fn bitor(mut self, rhs: T) -> Self::Output {
        self.0.extend(rhs.into().0);
        self
    }
}

impl<T: Into<EventSet>> BitOr<T> for EventFilter {
    type Output = EventSet;

    fn bitor(self, rhs: T) -> Self::Output {
        EventSet::from(self) | rhs
    }
}

impl<T: Into<EventSet>> BitOr<T> for Event {
    type Output = EventSet;

    fn bitor(self, rhs: T) -> Self::Output {
        EventSet::from(self) | rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(epoch: usize, iteration: usize) -> State {
        State {
            epoch,
            iteration,
            ..State::default()
        }
    }

    #[test]
    fn every_counts_iterations() {
        let filter = Event::IterationCompleted.every(200);
        assert!(filter.matches(Event::IterationCompleted, &at(1, 400)));
        assert!(!filter.matches(Event::IterationCompleted, &at(1, 401)));
        assert!(!filter.matches(Event::IterationStarted, &at(1, 400)));
    }

    #[test]
    fn once_fires_a_single_time() {
        let filter = Event::IterationStarted.once(10);
        let hits = (1..=30)
            .filter(|&i| filter.matches(Event::IterationStarted, &at(1, i)))
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn union_matches_any_member() {
        let set = Event::EpochCompleted.every(3) | Event::Completed;
        assert!(set.matches(Event::EpochCompleted, &at(6, 0)));
        assert!(!set.matches(Event::EpochCompleted, &at(5, 0)));
        assert!(set.matches(Event::Completed, &at(5, 0)));
        assert!(!set.matches(Event::Terminate, &at(5, 0)));
    }
}
