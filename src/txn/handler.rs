use std::sync::Arc;

use tracing::trace;

use super::{Transactional, TxnMode};
use crate::types::Result;

/// Ordered composite of transactional components.
///
/// Every hook is forwarded to each part in registration order.
pub struct TxnHandler {
    label: String,
    parts: Vec<Arc<dyn Transactional>>,
}

impl TxnHandler {
    /// Empty composite.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            parts: Vec::new(),
        }
    }

    /// Appends `part` to the fan-out order.
    pub fn with(mut self, part: Arc<dyn Transactional>) -> Self {
        self.parts.push(part);
        self
    }

    /// Appends `part` to the fan-out order.
    pub fn push(&mut self, part: Arc<dyn Transactional>) {
        self.parts.push(part);
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether there are no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Labels of the parts in fan-out order.
    pub fn labels(&self) -> Vec<&str> {
        self.parts.iter().map(|part| part.label()).collect()
    }
}

impl Transactional for TxnHandler {
    fn label(&self) -> &str {
        &self.label
    }

    fn prepare_begin(&self, mode: TxnMode) {
        for part in &self.parts {
            trace!(handler = %self.label, part = part.label(), ?mode, "txn.handler.begin");
            part.prepare_begin(mode);
        }
    }

    fn commit(&self) -> Result<()> {
        for part in &self.parts {
            trace!(handler = %self.label, part = part.label(), "txn.handler.commit");
            part.commit()?;
        }
        Ok(())
    }

    fn abort(&self) {
        for part in &self.parts {
            trace!(handler = %self.label, part = part.label(), "txn.handler.abort");
            part.abort();
        }
    }

    fn end(&self) {
        for part in &self.parts {
            part.end();
        }
    }
}
