#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    use crossbeam_channel::bounded;
    use parking_lot::Mutex;
    use phalanx::config::ServiceConfig;
    use phalanx::engine::analyzer::SimpleAnalyzer;
    use phalanx::engine::memory::MemoryEngine;
    use phalanx::engine::query::Query;
    use phalanx::engine::{IndexDirectory, IndexWriter};
    use phalanx::error::{PhalanxError, Result};
    use phalanx::events::{IndexEvent, IndexEventKind, IndexListener};
    use phalanx::item::{IndexItem, ObjectId};
    use phalanx::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
    use phalanx::plugin::{IndexPlugin, SearchCriteria};
    use phalanx::search::SearchMode;
    use phalanx::service::{ExecutionMode, IndexService};
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<(IndexEventKind, IndexItem, ThreadId)>>,
    }

    impl Recorder {
        fn count(&self, kind: IndexEventKind) -> usize {
            self.events.lock().iter().filter(|(k, _, _)| *k == kind).count()
        }
    }

    impl IndexListener for Recorder {
        fn on_index_event(&self, event: &IndexEvent) -> Result<()> {
            self.events.lock().push((
                event.kind(),
                event.source().clone(),
                thread::current().id(),
            ));
            Ok(())
        }
    }

    struct Fixture {
        service: Arc<IndexService>,
        store: Arc<JsonObjectStore>,
        recorder: Arc<Recorder>,
        engine: Arc<MemoryEngine>,
        dir: TempDir,
    }

    fn fixture(configure: impl FnOnce(ServiceConfig) -> ServiceConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonObjectStore::new());
        let plugin: Arc<dyn IndexPlugin> =
            Arc::new(JsonDocumentPlugin::new("notes", Arc::clone(&store)));
        let config = configure(ServiceConfig::new(dir.path()).with_callback_threads(2));
        let engine = Arc::new(MemoryEngine::new());
        let service =
            Arc::new(IndexService::initialize(config, engine.clone(), vec![plugin]).unwrap());
        let recorder = Arc::new(Recorder::default());
        service.add_event_listener(recorder.clone());
        Fixture {
            service,
            store,
            recorder,
            engine,
            dir,
        }
    }

    /// Count matches in FIFO order with everything submitted before.
    fn sync_count(service: &IndexService, query: Query) -> usize {
        service
            .do_index_query_op("notes", query, SearchMode::Synchronous, |_, _, _, hits| {
                Ok(hits.len())
            })
            .unwrap()
    }

    #[test]
    fn test_repeated_updates_collapse_to_latest() {
        let f = fixture(|c| c.with_update_buffer(10, Duration::ZERO));
        assert_eq!(f.service.default_mode(), ExecutionMode::Buffered);

        f.service
            .index_object("notes", json!({"id": "1", "title": "alpha"}))
            .unwrap();
        f.service
            .index_object("notes", json!({"id": "1", "title": "beta"}))
            .unwrap();

        assert_eq!(sync_count(&f.service, Query::term("id", "1")), 1);
        assert_eq!(sync_count(&f.service, Query::term("title", "beta")), 1);
        assert_eq!(sync_count(&f.service, Query::term("title", "alpha")), 0);
        assert_eq!(f.recorder.count(IndexEventKind::Update), 1);
    }

    #[test]
    fn test_delete_after_update_in_one_batch() {
        let f = fixture(|c| c.with_update_buffer(10, Duration::ZERO));

        f.service
            .index_object("notes", json!({"id": "7", "title": "short lived"}))
            .unwrap();
        f.service.delete_object_by_id("notes", "7").unwrap();

        assert_eq!(sync_count(&f.service, Query::term("id", "7")), 0);
        assert_eq!(f.recorder.count(IndexEventKind::Update), 0);
        assert_eq!(f.recorder.count(IndexEventKind::Delete), 1);
    }

    #[test]
    fn test_buffer_size_one_indexes_on_calling_thread() {
        let f = fixture(|c| c.with_update_buffer(1, Duration::ZERO));
        assert_eq!(f.service.default_mode(), ExecutionMode::Immediate);
        f.store.put(42u64, json!({"id": 42, "title": "answer"}));

        f.service.index_object_by_id("notes", 42u64).unwrap();

        let found = f.service.count("notes", &Query::term("id", "42")).unwrap();
        assert_eq!(found, 1);
        let events = f.recorder.events.lock();
        let updates: Vec<_> = events
            .iter()
            .filter(|(kind, _, _)| *kind == IndexEventKind::Update)
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, IndexItem::Id(ObjectId::from(42u64)));
        assert_eq!(updates[0].2, thread::current().id());
    }

    #[test]
    fn test_immediate_mode_overrides_buffering() {
        let f = fixture(|c| c.with_update_buffer(100, Duration::ZERO));

        f.service
            .index_object_with(
                "notes",
                json!({"id": "3", "title": "now"}),
                ExecutionMode::Immediate,
            )
            .unwrap();
        assert_eq!(f.service.count("notes", &Query::term("id", "3")).unwrap(), 1);
    }

    #[test]
    fn test_synchronous_search_sees_queued_updates() {
        let f = fixture(|c| c.with_update_buffer(100, Duration::ZERO));

        for i in 0..5u64 {
            f.service
                .index_object("notes", json!({"id": i, "title": format!("note {i}")}))
                .unwrap();
        }
        assert_eq!(sync_count(&f.service, Query::term("title", "note")), 5);
        assert_eq!(f.service.status().indexes[0].buffered_updates, 0);
    }

    #[test]
    fn test_flush_timer_applies_buffered_updates() {
        let f = fixture(|c| c.with_update_buffer(100, Duration::from_millis(20)));

        f.service
            .index_object("notes", json!({"id": "1", "title": "timed"}))
            .unwrap();

        let mut found = 0;
        for _ in 0..200 {
            found = f.service.count("notes", &Query::term("id", "1")).unwrap();
            if found == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(found, 1);
    }

    #[test]
    fn test_delete_object_resolves_id_through_plugin() {
        let f = fixture(|c| c);
        let object = json!({"id": "9", "title": "to remove"});
        f.service.index_object("notes", object.clone()).unwrap();
        assert_eq!(f.service.count("notes", &Query::term("id", "9")).unwrap(), 1);

        f.service.delete_object("notes", object).unwrap();
        assert_eq!(f.service.count("notes", &Query::term("id", "9")).unwrap(), 0);
        assert_eq!(f.recorder.count(IndexEventKind::Delete), 1);
    }

    #[test]
    fn test_missing_object_is_skipped() {
        let f = fixture(|c| c);
        f.store.put("1", json!({"id": "1", "title": "present"}));

        f.service.index_object_by_id("notes", "missing").unwrap();
        f.service.index_object_by_id("notes", "1").unwrap();

        assert_eq!(f.service.count("notes", &Query::MatchAll).unwrap(), 1);
        assert_eq!(f.recorder.count(IndexEventKind::Update), 1);
    }

    #[test]
    fn test_reindex_reports_results() {
        let f = fixture(|c| c);
        f.store.put("1", json!({"id": "1", "title": "one"}));
        f.store.put("2", json!({"id": "2", "title": "two"}));
        f.store.put("bad", json!("not an object"));

        let callback = f.service.reindex("notes").unwrap();
        callback.wait_until_done().unwrap();

        let results = callback.index_results().unwrap();
        assert!(results.finished);
        assert_eq!(results.num_processed, 3);
        assert_eq!(results.num_indexed, 2);
        assert!(results.errors.contains_key("bad"));
        assert_eq!(f.service.count("notes", &Query::MatchAll).unwrap(), 2);
    }

    #[test]
    fn test_find_and_count_only() {
        let f = fixture(|c| c);
        for i in 0..4u64 {
            f.service
                .index_object("notes", json!({"id": i, "title": "shared words"}))
                .unwrap();
        }

        let counted = f
            .service
            .find("notes", &SearchCriteria::new("shared").count_only())
            .unwrap();
        assert_eq!(counted.total_matches, 4);
        assert!(counted.matches.is_empty());

        let page = f
            .service
            .find("notes", &SearchCriteria::new("shared").with_page(3, 2))
            .unwrap();
        assert_eq!(page.total_matches, 4);
        assert_eq!(page.matches.len(), 1);
        assert!(page.matches[0].id.is_some());
        assert_eq!(
            page.matches[0].fields.get("title"),
            Some(&vec!["shared words".to_string()])
        );
    }

    #[test]
    fn test_paged_search_and_terms() {
        let f = fixture(|c| c);
        f.service
            .index_object("notes", json!({"id": "1", "title": "red fox", "tags": ["a", "b"]}))
            .unwrap();
        f.service
            .index_object("notes", json!({"id": "2", "title": "red hen"}))
            .unwrap();

        let page = f.service.search("notes", "red", 0, 0, 1).unwrap();
        assert_eq!(page.total_matches, 2);
        for row in &page.results {
            assert!(row.contains_key("tags"));
        }
        assert!(page.results.iter().any(|row| row["tags"].is_none()));

        let terms = f.service.field_terms("notes", "title").unwrap();
        let terms: Vec<_> = terms.into_iter().collect();
        assert_eq!(terms, vec!["fox", "hen", "red"]);
    }

    #[test]
    fn test_queries_are_counted() {
        let f = fixture(|c| c);
        f.service.search("notes", "anything", 0, 0, 1).unwrap();
        f.service.search("notes", "anything", 0, 0, 1).unwrap();
        let status = f.service.status();
        assert_eq!(status.indexes[0].query_count, 2);
        assert_eq!(status.indexes[0].live_reads, 0);
    }

    #[test]
    fn test_synchronous_search_reports_failed_flush() {
        let f = fixture(|c| c.with_update_buffer(100, Duration::ZERO));
        f.service
            .index_object("notes", json!({"id": "1", "title": "blocked"}))
            .unwrap();

        // An outside writer holds the directory, so the flush ahead of the
        // search cannot open its own.
        let directory = f.engine.directory(&f.dir.path().join("notes")).unwrap();
        let mut outside = directory
            .new_writer(Arc::new(SimpleAnalyzer::new()), false)
            .unwrap();

        let (sender, outcome) = bounded(1);
        let service = Arc::clone(&f.service);
        let searcher = thread::spawn(move || {
            let result = service.do_index_query_op(
                "notes",
                Query::MatchAll,
                SearchMode::Synchronous,
                |_, _, _, hits| Ok(hits.len()),
            );
            let _ = sender.send(result);
        });

        let result = outcome.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(PhalanxError::Callback(_))));
        searcher.join().unwrap();
        outside.close().unwrap();

        assert_eq!(f.service.count("notes", &Query::MatchAll).unwrap(), 0);
    }

    #[test]
    fn test_finish_applies_pending_buffered_updates() {
        let f = fixture(|c| c.with_update_buffer(100, Duration::ZERO));
        for i in 0..5u64 {
            f.service
                .index_object("notes", json!({"id": i, "title": format!("pending {i}")}))
                .unwrap();
        }

        f.service.finish();

        let directory = f.engine.directory(&f.dir.path().join("notes")).unwrap();
        assert_eq!(directory.stats().num_docs, 5);
        assert_eq!(f.recorder.count(IndexEventKind::Update), 5);
    }

    #[test]
    fn test_searches_publish_query_events() {
        let f = fixture(|c| c.with_update_buffer(10, Duration::ZERO));

        f.service.search("notes", "anything", 0, 0, 1).unwrap();
        sync_count(&f.service, Query::term("title", "nothing"));
        f.service
            .find("notes", &SearchCriteria::new("something"))
            .unwrap();

        let events = f.recorder.events.lock();
        let queries: Vec<_> = events
            .iter()
            .filter(|(kind, _, _)| *kind == IndexEventKind::Query)
            .map(|(_, source, _)| source.clone())
            .collect();
        assert_eq!(
            queries,
            vec![
                IndexItem::Object(json!("Gtext:anything")),
                IndexItem::Object(json!("title:nothing")),
                IndexItem::Object(json!("something")),
            ]
        );
    }
}
