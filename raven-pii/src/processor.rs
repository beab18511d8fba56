use serde_json::Value;

/// A transformation applied to a serialized event document.
///
/// Processors mutate the document in place. They must keep the document serializable and must
/// not change the presence of fields they do not own.
pub trait Processor: Send + Sync {
    /// Processes the document.
    fn process(&self, document: &mut Value);
}

/// Applies each processor in order.
pub fn process_all(processors: &[Box<dyn Processor>], document: &mut Value) {
    for processor in processors {
        processor.process(document);
    }
}
