use std::time::Duration;

use tracing::{debug, info, warn};
use types::{Operation, WidgetRequest};

use crate::sink::{SinkError, WidgetSink};
use crate::source::RequestSource;
use crate::validator;

/// The request processing engine: polls a source, validates each request,
/// applies the mutation to a sink, and acknowledges the request. Generic
/// over its seams so tests can substitute in-memory backends.
pub struct Engine<S, K> {
    source: S,
    sink: K,
    max_idle_polls: u32,
    poll_interval: Duration,
}

/// Tally of one engine run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Requests applied to the sink and acknowledged.
    pub fulfilled: usize,
    /// Requests skipped: invalid, unrecognized, or failed at the sink. These
    /// stay in the source and will be re-delivered.
    pub skipped: usize,
}

impl<S: RequestSource, K: WidgetSink> Engine<S, K> {
    pub fn new(
        source: S,
        sink: K,
        max_idle_polls: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            max_idle_polls,
            poll_interval,
        }
    }

    /// Drain the source until the consecutive unproductive-poll counter
    /// exceeds the configured threshold, then terminate cleanly with the
    /// tally. Every failure inside the loop is a warning, never a crash.
    pub async fn run(self) -> EngineReport {
        let mut report = EngineReport::default();
        let mut idle_polls: u32 = 0;

        while idle_polls <= self.max_idle_polls {
            let pending = match self.source.poll().await {
                Ok(pending) => pending,
                Err(err) => {
                    // Transient source errors count as an empty poll.
                    warn!("failed to poll for requests: {err}");
                    None
                }
            };

            let Some(pending) = pending else {
                idle_polls += 1;
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            let Some(request) = validator::validate(&pending.body) else {
                // The request stays in its source and will be re-delivered.
                // Skipped work still advances the idle counter so a poison
                // request cannot keep the loop open forever.
                report.skipped += 1;
                idle_polls += 1;
                continue;
            };

            if let Err(err) = self.apply(&request).await {
                warn!(
                    "request '{}' could not be applied ({err}), skipping",
                    request.request_id
                );
                report.skipped += 1;
                idle_polls += 1;
                continue;
            }

            if let Err(err) = self.source.acknowledge(&pending.receipt).await {
                // The mutation stands; the unacknowledged request may be
                // re-delivered and applied again.
                warn!(
                    "request '{}' could not be acknowledged: {err}",
                    request.request_id
                );
            }

            debug!("fulfilled request '{}'", request.request_id);
            report.fulfilled += 1;
            idle_polls = 0;
        }

        info!(
            "no new requests after {} consecutive polls, terminating",
            self.max_idle_polls
        );

        report
    }

    async fn apply(&self, request: &WidgetRequest) -> Result<(), SinkError> {
        match &request.operation {
            Operation::Create(widget) => {
                self.sink.save(widget).await?;
                info!("created widget '{}'", widget.widget_id);
            }
            Operation::Update(widget) => {
                self.sink.save(widget).await?;
                info!("updated widget '{}'", widget.widget_id);
            }
            Operation::Delete(target) => {
                self.sink.delete(target).await?;
                info!("deleted widget '{}'", target.widget_id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use crate::source::{PendingRequest, Receipt, SourceError};
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::collections::{BTreeMap, HashMap};
    use std::rc::Rc;
    use types::{Widget, WidgetRef};

    /// In-memory source: a key-ordered map of pending bodies, so polling
    /// returns the smallest key first like the bucket variant.
    #[derive(Clone, Default)]
    struct MemorySource {
        requests: Rc<RefCell<BTreeMap<String, String>>>,
    }

    impl MemorySource {
        fn enqueue(&self, key: &str, body: &str) {
            self.requests
                .borrow_mut()
                .insert(key.to_string(), body.to_string());
        }

        fn len(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl RequestSource for MemorySource {
        async fn poll(&self) -> Result<Option<PendingRequest>, SourceError> {
            Ok(self.requests.borrow().iter().next().map(|(key, body)| {
                PendingRequest {
                    body: body.clone().into_bytes(),
                    receipt: Receipt::new(key.clone()),
                }
            }))
        }

        async fn acknowledge(
            &self,
            receipt: &Receipt,
        ) -> Result<(), SourceError> {
            self.requests.borrow_mut().remove(receipt.as_str());
            Ok(())
        }
    }

    /// In-memory sink keyed by widget id, counting writes.
    #[derive(Clone, Default)]
    struct MemorySink {
        widgets: Rc<RefCell<HashMap<String, Widget>>>,
        saves: Rc<Cell<usize>>,
    }

    impl MemorySink {
        fn get(&self, widget_id: &str) -> Option<Widget> {
            self.widgets.borrow().get(widget_id).cloned()
        }
    }

    impl WidgetSink for MemorySink {
        async fn save(&self, widget: &Widget) -> Result<(), SinkError> {
            self.saves.set(self.saves.get() + 1);
            self.widgets
                .borrow_mut()
                .insert(widget.widget_id.clone(), widget.clone());
            Ok(())
        }

        async fn delete(&self, target: &WidgetRef) -> Result<(), SinkError> {
            self.widgets.borrow_mut().remove(&target.widget_id);
            Ok(())
        }

        async fn exists(&self, target: &WidgetRef) -> Result<bool, SinkError> {
            Ok(self.widgets.borrow().contains_key(&target.widget_id))
        }
    }

    fn engine(
        source: &MemorySource,
        sink: &MemorySink,
    ) -> Engine<MemorySource, MemorySink> {
        Engine::new(source.clone(), sink.clone(), 2, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_create_persists_widget_and_acknowledges() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        source.enqueue(
            "1700000000-r1",
            r#"{"requestId":"r1","type":"create","widgetId":"w1",
                "owner":"Jane Doe","description":"demo"}"#,
        );

        let report = engine(&source, &sink).run().await;

        assert_eq!(report.fulfilled, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(source.len(), 0);
        assert_eq!(
            sink.get("w1"),
            Some(Widget {
                widget_id: "w1".to_string(),
                owner: "Jane Doe".to_string(),
                description: Some("demo".to_string()),
                label: None,
                other_attributes: None,
            })
        );
    }

    #[tokio::test]
    async fn test_update_overwrites_stored_widget_in_full() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        sink.widgets.borrow_mut().insert(
            "w1".to_string(),
            Widget {
                widget_id: "w1".to_string(),
                owner: "Jane Doe".to_string(),
                description: Some("old".to_string()),
                label: Some("keep me?".to_string()),
                other_attributes: None,
            },
        );
        source.enqueue(
            "r2",
            r#"{"requestId":"r2","type":"update","widgetId":"w1",
                "owner":"Jane Doe","description":"new"}"#,
        );

        engine(&source, &sink).run().await;

        let stored = sink.get("w1").unwrap();
        assert_eq!(stored.description.as_deref(), Some("new"));
        // fields absent from the update must not survive from the old record
        assert_eq!(stored.label, None);
    }

    #[tokio::test]
    async fn test_delete_removes_widget() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        sink.widgets.borrow_mut().insert(
            "w1".to_string(),
            Widget {
                widget_id: "w1".to_string(),
                owner: "Jane Doe".to_string(),
                description: None,
                label: None,
                other_attributes: None,
            },
        );
        source.enqueue(
            "r3",
            r#"{"requestId":"r3","type":"delete","widgetId":"w1",
                "owner":"Jane Doe"}"#,
        );

        let report = engine(&source, &sink).run().await;

        assert_eq!(report.fulfilled, 1);
        assert_eq!(sink.get("w1"), None);
        assert_eq!(source.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_absent_widget_still_acknowledges() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        source.enqueue(
            "r4",
            r#"{"requestId":"r4","type":"delete","widgetId":"ghost",
                "owner":"Jane Doe"}"#,
        );

        let report = engine(&source, &sink).run().await;

        assert_eq!(report.fulfilled, 1);
        assert_eq!(source.len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_is_never_acknowledged() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        // missing owner on a create
        source.enqueue(
            "r5",
            r#"{"requestId":"r5","type":"create","widgetId":"w1"}"#,
        );

        let report = engine(&source, &sink).run().await;

        // never reached the sink, still pending in the source
        assert_eq!(sink.saves.get(), 0);
        assert_eq!(source.len(), 1);
        assert_eq!(report.fulfilled, 0);
        assert!(report.skipped > 0);
    }

    #[tokio::test]
    async fn test_unknown_type_is_never_acknowledged() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        source.enqueue(
            "r6",
            r#"{"requestId":"r6","type":"destroy","widgetId":"w1",
                "owner":"Jane Doe"}"#,
        );

        let report = engine(&source, &sink).run().await;

        assert_eq!(sink.saves.get(), 0);
        assert_eq!(source.len(), 1);
        assert_eq!(report.fulfilled, 0);
    }

    #[tokio::test]
    async fn test_processing_create_twice_is_idempotent() {
        let source = MemorySource::default();
        let sink = MemorySink::default();
        let body = r#"{"requestId":"r7","type":"create","widgetId":"w1",
            "owner":"Jane Doe","description":"demo"}"#;
        source.enqueue("0001-r7", body);
        source.enqueue("0002-r7", body);

        let report = engine(&source, &sink).run().await;

        assert_eq!(report.fulfilled, 2);
        assert_eq!(sink.widgets.borrow().len(), 1);
        assert_eq!(
            sink.get("w1").unwrap().description.as_deref(),
            Some("demo")
        );
    }

    #[tokio::test]
    async fn test_idle_termination_with_empty_source() {
        let source = MemorySource::default();
        let sink = MemorySink::default();

        let report = engine(&source, &sink).run().await;

        assert_eq!(report, EngineReport::default());
        assert_eq!(sink.saves.get(), 0);
    }

    /// A source that always fails, standing in for a misconfigured queue.
    struct BrokenSource;

    impl RequestSource for BrokenSource {
        async fn poll(&self) -> Result<Option<PendingRequest>, SourceError> {
            Err(SourceError::Receive("invalid queue URL".to_string()))
        }

        async fn acknowledge(
            &self,
            _receipt: &Receipt,
        ) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_source_errors_terminate_like_empty_polls() {
        let sink = MemorySink::default();
        let report =
            Engine::new(BrokenSource, sink.clone(), 2, Duration::ZERO)
                .run()
                .await;

        assert_eq!(report, EngineReport::default());
        assert_eq!(sink.saves.get(), 0);
    }
}
