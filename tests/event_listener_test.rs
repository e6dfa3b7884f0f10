#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock, Weak};
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::{Sender, bounded};
    use parking_lot::Mutex;

    use phalanx::config::ServiceConfig;
    use phalanx::engine::memory::MemoryEngine;
    use phalanx::engine::query::Query;
    use phalanx::error::{PhalanxError, Result};
    use phalanx::events::{IndexEvent, IndexEventKind, IndexListener, IndexUpdateTracker};
    use phalanx::plugin::IndexPlugin;
    use phalanx::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
    use phalanx::service::IndexService;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct Counting {
        updates: AtomicUsize,
    }

    impl IndexListener for Counting {
        fn on_index_event(&self, event: &IndexEvent) -> Result<()> {
            if event.kind() == IndexEventKind::Update {
                self.updates.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl IndexListener for Failing {
        fn on_index_event(&self, _event: &IndexEvent) -> Result<()> {
            Err(PhalanxError::other("listener failure"))
        }
    }

    #[derive(Debug)]
    struct Panicking;

    impl IndexListener for Panicking {
        fn on_index_event(&self, _event: &IndexEvent) -> Result<()> {
            panic!("listener panic")
        }
    }

    fn start(dir: &TempDir, store: &Arc<JsonObjectStore>) -> IndexService {
        let plugin: Arc<dyn IndexPlugin> =
            Arc::new(JsonDocumentPlugin::new("notes", Arc::clone(store)));
        IndexService::initialize(
            ServiceConfig::new(dir.path()),
            Arc::new(MemoryEngine::new()),
            vec![plugin],
        )
        .unwrap()
    }

    #[test]
    fn test_failing_listeners_do_not_stop_delivery() {
        let dir = TempDir::new().unwrap();
        let service = start(&dir, &Arc::new(JsonObjectStore::new()));
        let counting = Arc::new(Counting::default());
        service.add_event_listener(Arc::new(Failing));
        service.add_event_listener(Arc::new(Panicking));
        service.add_event_listener(counting.clone());

        service
            .index_object("notes", json!({"id": "1", "title": "still indexed"}))
            .unwrap();

        assert_eq!(counting.updates.load(Ordering::SeqCst), 1);
        assert_eq!(service.count("notes", &Query::term("id", "1")).unwrap(), 1);
    }

    #[test]
    fn test_removed_listener_is_not_notified() {
        let dir = TempDir::new().unwrap();
        let service = start(&dir, &Arc::new(JsonObjectStore::new()));
        let counting = Arc::new(Counting::default());
        let listener: Arc<dyn IndexListener> = counting.clone();
        service.add_event_listener(Arc::clone(&listener));

        service.index_object("notes", json!({"id": "1"})).unwrap();
        assert!(service.remove_event_listener(&listener));
        assert!(!service.remove_event_listener(&listener));
        service.index_object("notes", json!({"id": "2"})).unwrap();

        assert_eq!(counting.updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tracker_cleans_up_indexed_items() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonObjectStore::new());
        store.put("a", json!({"id": "a", "title": "first"}));
        let service = start(&dir, &store);
        let tracker = Arc::new(IndexUpdateTracker::new());
        service.add_event_listener(tracker.clone());

        service.index_object_by_id("notes", "a").unwrap();
        service
            .index_object("notes", json!({"id": "b", "title": "second"}))
            .unwrap();
        assert_eq!(tracker.updates("notes").len(), 2);
        assert_eq!(service.count("notes", &Query::MatchAll).unwrap(), 2);

        assert_eq!(tracker.clean_up(&service), 2);
        assert!(tracker.updates("notes").is_empty());
        assert_eq!(service.count("notes", &Query::MatchAll).unwrap(), 0);
    }

    /// Mirrors every `notes` update into the `audit` index from inside the
    /// listener call.
    #[derive(Debug, Default)]
    struct Mirror {
        service: OnceLock<Weak<IndexService>>,
        entered: Mutex<Option<Sender<()>>>,
    }

    impl IndexListener for Mirror {
        fn on_index_event(&self, event: &IndexEvent) -> Result<()> {
            if event.kind() != IndexEventKind::Update || event.index_type() != "notes" {
                return Ok(());
            }
            let entered = self.entered.lock().take();
            if let Some(entered) = entered {
                let _ = entered.send(());
                // Give the concurrent finish() time to queue for the write lock.
                thread::sleep(Duration::from_millis(100));
            }
            match self.service.get().and_then(Weak::upgrade) {
                Some(service) => service.index_object("audit", json!({"id": "copy"})),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_listener_may_submit_while_finish_waits() {
        let dir = TempDir::new().unwrap();
        let plugins: Vec<Arc<dyn IndexPlugin>> = vec![
            Arc::new(JsonDocumentPlugin::new("notes", Arc::new(JsonObjectStore::new()))),
            Arc::new(JsonDocumentPlugin::new("audit", Arc::new(JsonObjectStore::new()))),
        ];
        let service = Arc::new(
            IndexService::initialize(
                ServiceConfig::new(dir.path()),
                Arc::new(MemoryEngine::new()),
                plugins,
            )
            .unwrap(),
        );
        let (entered_sender, entered) = bounded(1);
        let mirror = Arc::new(Mirror::default());
        mirror.service.set(Arc::downgrade(&service)).unwrap();
        *mirror.entered.lock() = Some(entered_sender);
        service.add_event_listener(mirror.clone());

        let (done_sender, done) = bounded(1);
        let writer_service = Arc::clone(&service);
        let writer = thread::spawn(move || {
            let outcome = writer_service.index_object("notes", json!({"id": "1"}));
            let _ = done_sender.send(outcome.is_ok());
        });

        entered.recv_timeout(Duration::from_secs(5)).unwrap();
        let finishing_service = Arc::clone(&service);
        let finisher = thread::spawn(move || finishing_service.finish());

        assert!(done.recv_timeout(Duration::from_secs(5)).unwrap());
        writer.join().unwrap();
        finisher.join().unwrap();
        assert!(service.is_finished());
    }
}
