use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;

use crate::jobs::{Job, JobContinuation, JobManager, JobPhase};

use super::event::Event;
use super::listener::{EventListener, ListenerId};

type WeakListener = Weak<dyn EventListener>;

/// Dispatches fired events to registered listeners as jobs (C2). Keeps a
/// topic -> weak-listener-list map; `FireEvent` kicks one job per
/// non-expired listener, and a periodic timer job prunes expired weak
/// references from every topic (default every 5s, per §4.2).
pub struct EventBroker {
    job_manager: JobManager,
    listeners: DashMap<String, Mutex<Vec<WeakListener>>>,
}

impl EventBroker {
    pub fn new(job_manager: JobManager) -> Arc<Self> {
        Arc::new(Self {
            job_manager,
            listeners: DashMap::new(),
        })
    }

    pub fn add_listener(&self, listener: &Arc<dyn EventListener>, topic: impl Into<String>) {
        let topic = topic.into();
        let entry = self.listeners.entry(topic).or_insert_with(|| Mutex::new(Vec::new()));
        entry.lock().unwrap().push(Arc::downgrade(listener));
    }

    /// Removes every registration of `id`, across all topics.
    pub fn remove_listener(&self, id: ListenerId) {
        for entry in self.listeners.iter() {
            let mut list = entry.value().lock().unwrap();
            list.retain(|weak| weak.upgrade().map(|l| l.id() != id).unwrap_or(false));
        }
    }

    pub fn remove_listener_from_topic(&self, id: ListenerId, topic: &str) {
        if let Some(entry) = self.listeners.get(topic) {
            let mut list = entry.lock().unwrap();
            list.retain(|weak| weak.upgrade().map(|l| l.id() != id).unwrap_or(false));
        }
    }

    pub fn has_listener(&self, id: ListenerId, topic: &str) -> bool {
        self.listeners
            .get(topic)
            .map(|entry| {
                entry
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|weak| weak.upgrade().map(|l| l.id() == id).unwrap_or(false))
            })
            .unwrap_or(false)
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.clear();
    }

    /// Kicks one job per currently registered, non-expired listener of
    /// `event`'s topic. Listeners of one firing have no ordering relative
    /// to one another and may run in parallel on different workers.
    pub fn fire_event(&self, event: Event) {
        let Some(entry) = self.listeners.get(&event.topic) else {
            return;
        };
        let snapshot: Vec<Arc<dyn EventListener>> = entry
            .lock()
            .unwrap()
            .iter()
            .filter_map(|weak| weak.upgrade())
            .collect();
        drop(entry);

        for listener in snapshot {
            let event = event.clone();
            let job = Job::shared(JobPhase::Main, true, move |_ctx| {
                let listener = listener.clone();
                let event = event.clone();
                async move {
                    listener.handle_event(event).await;
                    JobContinuation::Dispose
                }
            });
            self.job_manager.kick_job(job);
        }
    }

    /// Drops every expired weak reference from every topic.
    pub fn prune_expired(&self) {
        for entry in self.listeners.iter() {
            let mut list = entry.value().lock().unwrap();
            list.retain(|weak| weak.strong_count() > 0);
        }
    }

    /// Starts the periodic GC timer job (self-requeuing, `CLEAN_UP` phase)
    /// that calls [`EventBroker::prune_expired`] every `interval`.
    pub fn start_cleanup_timer(self: &Arc<Self>, interval: Duration) {
        let broker = self.clone();
        let job = crate::jobs::TimerJob::shared(JobPhase::CleanUp, false, interval, move |_ctx| {
            let broker = broker.clone();
            async move {
                broker.prune_expired();
                JobContinuation::Requeue
            }
        });
        self.job_manager.kick_job(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobManagerConfig;
    use crate::value::ValueMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        id: ListenerId,
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl EventListener for CountingListener {
        fn id(&self) -> ListenerId {
            self.id
        }

        async fn handle_event(&self, _event: Event) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fan_out_invokes_every_listener_of_topic_once() {
        let manager = JobManager::new(JobManagerConfig::default());
        let broker = EventBroker::new(manager.clone());

        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let count_c = Arc::new(AtomicUsize::new(0));

        let a: Arc<dyn EventListener> = Arc::new(CountingListener {
            id: ListenerId::new(),
            count: count_a.clone(),
        });
        let b: Arc<dyn EventListener> = Arc::new(CountingListener {
            id: ListenerId::new(),
            count: count_b.clone(),
        });
        let c: Arc<dyn EventListener> = Arc::new(CountingListener {
            id: ListenerId::new(),
            count: count_c.clone(),
        });

        broker.add_listener(&a, "t");
        broker.add_listener(&b, "t");
        broker.add_listener(&c, "u");

        broker.fire_event(Event::new("t", ValueMap::new()));
        manager.invoke_cycle_and_wait().await;

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        assert_eq!(count_c.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_listener_is_pruned_and_not_invoked() {
        let manager = JobManager::new(JobManagerConfig::default());
        let broker = EventBroker::new(manager.clone());
        let count = Arc::new(AtomicUsize::new(0));

        {
            let listener: Arc<dyn EventListener> = Arc::new(CountingListener {
                id: ListenerId::new(),
                count: count.clone(),
            });
            broker.add_listener(&listener, "t");
        }
        // listener dropped here; only the broker's weak ref remains.
        broker.prune_expired();

        broker.fire_event(Event::new("t", ValueMap::new()));
        manager.invoke_cycle_and_wait().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
