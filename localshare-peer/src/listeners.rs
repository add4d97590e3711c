use std::sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered set of callbacks.
///
/// `notify` copies the current list and releases the lock before calling
/// anything, so a callback may add or remove listeners (including itself).
/// Such changes take effect from the next notification on.
pub struct ListenerRegistry<E: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Listener<E>)>>,
}

impl<E: ?Sized> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }
}

impl<E: ?Sized> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> std::fmt::Debug for ListenerRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn notifies_in_registration_order() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            registry.add(Arc::new(move |value: &u32| {
                seen.lock().unwrap().push(format!("{tag}:{value}"));
            }));
        }

        registry.notify(&7);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:7", "second:7", "third:7"]
        );
    }

    #[test]
    fn removed_listener_is_not_called() {
        let registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&hits);
        let id = registry.add(Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.notify(&1);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        registry.notify(&2);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_notify() {
        let registry: Arc<ListenerRegistry<u32>> = Arc::new(ListenerRegistry::new());
        let own_id = Arc::new(Mutex::new(None::<ListenerId>));
        let hits = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&registry);
        let slot = Arc::clone(&own_id);
        let counter = Arc::clone(&hits);
        let id = registry.add(Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(registry), Some(id)) = (weak.upgrade(), *slot.lock().unwrap()) {
                registry.remove(id);
            }
        }));
        *own_id.lock().unwrap() = Some(id);

        registry.notify(&1);
        registry.notify(&2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn works_with_unsized_events() {
        let registry: ListenerRegistry<[u8]> = ListenerRegistry::new();
        let total = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&total);
        registry.add(Arc::new(move |bytes: &[u8]| {
            sink.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        }));
        registry.notify(&[1, 2, 3][..]);
        assert_eq!(total.load(Ordering::SeqCst), 3);
    }
}
