use crate::node::Space;

/// Notifications emitted by a [`TraceTree`](crate::TraceTree)
#[derive(Clone, Debug, PartialEq)]
pub enum TraceTreeEvent {
    /// The trace's `[start, duration]` bounds were widened
    TimelineChange(Space),
}

/// Handle returned by [`EventDispatcher::on`], used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&TraceTreeEvent) + Send>;

#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl EventDispatcher {
    pub fn on(&mut self, listener: impl FnMut(&TraceTreeEvent) + Send + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the listener was already removed
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, event: &TraceTreeEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
