//! Per-topic ordered registry of message processors.

use parking_lot::RwLock;
use shardlink_core::{MessageProcessor, P2pError};
use std::sync::Arc;

/// Ordered `(identifier → processor)` set for one topic.
///
/// Iteration order is registration order; identifiers are unique per topic.
pub struct TopicProcessors {
    topic: String,
    entries: RwLock<Vec<(String, Arc<dyn MessageProcessor>)>>,
}

impl TopicProcessors {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn add(
        &self,
        identifier: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), P2pError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|(id, _)| id == identifier) {
            return Err(P2pError::ProcessorAlreadyRegistered {
                topic: self.topic.clone(),
                identifier: identifier.to_string(),
            });
        }

        entries.push((identifier.to_string(), processor));
        Ok(())
    }

    pub fn remove(&self, identifier: &str) -> Result<(), P2pError> {
        let mut entries = self.entries.write();
        let position = entries.iter().position(|(id, _)| id == identifier).ok_or(
            P2pError::ProcessorNotRegistered {
                topic: self.topic.clone(),
                identifier: identifier.to_string(),
            },
        )?;

        entries.remove(position);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Atomic snapshot of identifiers and processors, in registration order.
    pub fn snapshot(&self) -> (Vec<String>, Vec<Arc<dyn MessageProcessor>>) {
        let entries = self.entries.read();
        entries.iter().map(|(id, p)| (id.clone(), p.clone())).unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardlink_core::{P2pMessage, PeerId, ProcessError};

    struct NoopProcessor;

    impl MessageProcessor for NoopProcessor {
        fn process_received_message(
            &self,
            _message: &P2pMessage,
            _from_connected_peer: &PeerId,
        ) -> Result<(), ProcessError> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let processors = TopicProcessors::new("topic");
        processors.add("id", Arc::new(NoopProcessor)).unwrap();

        assert!(matches!(
            processors.add("id", Arc::new(NoopProcessor)),
            Err(P2pError::ProcessorAlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_remove_unknown_identifier_fails() {
        let processors = TopicProcessors::new("topic");
        assert!(matches!(
            processors.remove("missing"),
            Err(P2pError::ProcessorNotRegistered { .. })
        ));
    }

    #[test]
    fn test_snapshot_preserves_registration_order() {
        let processors = TopicProcessors::new("topic");
        for id in ["first", "second", "third"] {
            processors.add(id, Arc::new(NoopProcessor)).unwrap();
        }
        processors.remove("second").unwrap();
        processors.add("fourth", Arc::new(NoopProcessor)).unwrap();

        let (identifiers, handlers) = processors.snapshot();
        assert_eq!(identifiers, vec!["first", "third", "fourth"]);
        assert_eq!(handlers.len(), 3);
    }

    #[test]
    fn test_empty_after_removing_last() {
        let processors = TopicProcessors::new("topic");
        processors.add("only", Arc::new(NoopProcessor)).unwrap();
        processors.remove("only").unwrap();
        assert!(processors.is_empty());
    }
}
