//! Tick events
//!
//! An [`Event`] is a list of owned listeners; registering one returns a
//! [`ListenerId`] that removes it again. [`StepFunction`] runs an early and a
//! late event once per step.

/// Handle to a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Box<dyn FnMut(&T)>;

/// Ordered set of listeners invoked with a shared argument
pub struct Event<T> {
    listeners: Vec<(ListenerId, Listener<T>)>,
    next_id: u64,
}

impl<T> Event<T> {
    /// Create an event without listeners
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Add a listener; listeners run in registration order
    pub fn register(&mut self, listener: impl FnMut(&T) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Call every listener with `argument`
    pub fn invoke(&mut self, argument: &T) {
        for (_, listener) in &mut self.listeners {
            listener(argument);
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether nobody is listening
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A step split into an early and a late phase
pub struct StepFunction<T> {
    early: Event<T>,
    late: Event<T>,
}

impl<T> StepFunction<T> {
    /// Create a step function without listeners
    pub fn new() -> Self {
        Self {
            early: Event::new(),
            late: Event::new(),
        }
    }

    /// Listeners run first in each step
    pub fn early_mut(&mut self) -> &mut Event<T> {
        &mut self.early
    }

    /// Listeners run after every early listener
    pub fn late_mut(&mut self) -> &mut Event<T> {
        &mut self.late
    }

    /// Run one step
    pub fn step(&mut self, argument: &T) {
        self.early.invoke(argument);
        self.late.invoke(argument);
    }
}

impl<T> Default for StepFunction<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_early_runs_before_late() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut step = StepFunction::<f32>::new();

        let late_log = Rc::clone(&log);
        step.late_mut().register(move |dt| late_log.borrow_mut().push(("late", *dt)));
        let early_log = Rc::clone(&log);
        step.early_mut().register(move |dt| early_log.borrow_mut().push(("early", *dt)));

        step.step(&0.5);

        assert_eq!(*log.borrow(), vec![("early", 0.5), ("late", 0.5)]);
    }

    #[test]
    fn test_removed_listener_no_longer_runs() {
        let count = Rc::new(RefCell::new(0));
        let mut event = Event::<f32>::new();

        let counter = Rc::clone(&count);
        let id = event.register(move |_| *counter.borrow_mut() += 1);
        event.invoke(&1.0);
        assert!(event.remove(id));
        assert!(!event.remove(id));
        event.invoke(&1.0);

        assert_eq!(*count.borrow(), 1);
        assert!(event.is_empty());
    }

    #[test]
    fn test_listener_ids_are_distinct() {
        let mut event = Event::<()>::new();
        let first = event.register(|_| {});
        let second = event.register(|_| {});

        assert_ne!(first, second);
        assert!(event.remove(first));
        assert_eq!(event.len(), 1);
    }
}
