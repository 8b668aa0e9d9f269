//! Provenance recording, tag promotion and history

use super::types::{ProvenanceEntry, ProvenanceRecord, TAG_CONFIRMED_FIELD, TAG_FIELD};
use crate::error::{RagdError, RagdResult};
use crate::model::{TagEntry, TagSource};
use crate::store::ProvenanceStore;
use std::collections::VecDeque;
use std::sync::Arc;

/// Entries fetched per history page
const DEFAULT_PAGE_SIZE: usize = 256;

/// Records where metadata came from and manages suggested tags.
pub struct ProvenanceTracker {
    store: Arc<dyn ProvenanceStore>,
    page_size: usize,
}

impl ProvenanceTracker {
    pub fn new(store: Arc<dyn ProvenanceStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Append a provenance fact about a document or chunk.
    ///
    /// A fact on the `tag` field also registers the tag itself: confirmed
    /// for manual sources, a pending suggestion otherwise.
    pub fn record(
        &self,
        entity_id: &str,
        field: &str,
        value: &str,
        source: TagSource,
        confidence: Option<f64>,
        created_by: &str,
    ) -> RagdResult<ProvenanceEntry> {
        if entity_id.trim().is_empty() {
            return Err(RagdError::InvalidIdentifier("entity id is empty".into()));
        }
        let record = ProvenanceRecord::new(entity_id, field, value, source, confidence, created_by)?;
        if field == TAG_FIELD {
            let tag = TagEntry::new(value, source, confidence, created_by)?;
            self.store.append_with_tag(&record, &tag)
        } else {
            self.store.append_provenance(&record)
        }
    }

    /// Confirm a suggested tag so it takes part in filtering.
    pub fn promote(&self, entity_id: &str, tag: &str, confirmed_by: &str) -> RagdResult<ProvenanceEntry> {
        let record = ProvenanceRecord::new(
            entity_id,
            TAG_CONFIRMED_FIELD,
            tag,
            TagSource::Manual,
            None,
            confirmed_by,
        )?;
        self.store.confirm_tag(entity_id, tag, &record)
    }

    /// All tags on an entity, confirmed or not
    pub fn tags(&self, entity_id: &str) -> RagdResult<Vec<TagEntry>> {
        self.store.list_tags(entity_id, None)
    }

    /// Unconfirmed tags awaiting review
    pub fn suggestions(&self, entity_id: &str) -> RagdResult<Vec<TagEntry>> {
        self.store.list_tags(entity_id, Some(false))
    }

    /// Full history of an entity, oldest first.
    pub fn history(&self, entity_id: &str) -> History {
        History {
            store: Arc::clone(&self.store),
            entity_id: entity_id.to_string(),
            page_size: self.page_size,
        }
    }
}

/// A restartable view over an entity's provenance log.
///
/// Nothing is read until iteration starts; each `iter()` begins again
/// from the first entry.
pub struct History {
    store: Arc<dyn ProvenanceStore>,
    entity_id: String,
    page_size: usize,
}

impl History {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            history: self,
            cursor: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = RagdResult<ProvenanceEntry>;
    type IntoIter = HistoryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pages through the log with a keyset cursor on the entry id
pub struct HistoryIter<'a> {
    history: &'a History,
    cursor: i64,
    buffer: VecDeque<ProvenanceEntry>,
    exhausted: bool,
}

impl Iterator for HistoryIter<'_> {
    type Item = RagdResult<ProvenanceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            let h = self.history;
            match h.store.provenance_page(&h.entity_id, self.cursor, h.page_size) {
                Ok(page) => {
                    self.exhausted = page.len() < h.page_size;
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        let entry = self.buffer.pop_front()?;
        self.cursor = entry.id;
        Some(Ok(entry))
    }
}
