//! The document registry and its update protocol.
//!
//! The store owns every open [`Document`], keyed by title, together with a
//! current-document pointer. Operations mutate documents in place through
//! [`DocumentStore::get_mut`] and then publish a [`DocumentUpdate`] so
//! dependent consumers (tree views, progress reporters, autosave) learn
//! which part of which document changed.
//!
//! Subscribers receive updates over bounded channels and the publish side
//! blocks when a subscriber falls behind, so a slow consumer slows the
//! producer instead of dropping or corrupting updates.

use crossbeam_channel::{bounded, Receiver, Sender};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::document::Document;

/// Capacity of each subscriber's update channel.
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Which part of a document an operation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    /// The document itself was created or replaced wholesale.
    Document,
    MassSpectrum,
    Chromatogram,
    Mobilogram,
    Heatmap,
    Ions { label: String },
    CombinedIons { label: String },
    MassSpectra { label: String },
    Mobilograms { label: String },
    Overlay { label: String },
    Statistics { label: String },
    Comparison { label: String },
}

/// One published change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub title: String,
    pub kind: UpdateKind,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No document registered under the title {0:?}")]
    UnknownDocument(String),
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: IndexMap<String, Document>,
    current: Option<String>,
    subscribers: Vec<Sender<DocumentUpdate>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.documents.contains_key(title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(|t| t.as_str())
    }

    /// Every registered document, in registration order. This is also the
    /// serializable face of the store: writing it out is the project file.
    pub fn documents(&self) -> &IndexMap<String, Document> {
        &self.documents
    }

    pub fn get(&self, title: &str) -> Result<&Document, StoreError> {
        self.documents
            .get(title)
            .ok_or_else(|| StoreError::UnknownDocument(title.to_string()))
    }

    pub fn get_mut(&mut self, title: &str) -> Result<&mut Document, StoreError> {
        self.documents
            .get_mut(title)
            .ok_or_else(|| StoreError::UnknownDocument(title.to_string()))
    }

    /// Register a document under its own title, replacing any previous
    /// holder of that title, and make it current.
    pub fn put(&mut self, document: Document) -> &mut Document {
        let title = document.title.clone();
        self.current = Some(title.clone());
        self.documents.insert(title.clone(), document);
        &mut self.documents[&title]
    }

    /// Fetch a document, creating and registering it first if the title is
    /// not taken. Used by overlay operations that lazily create their
    /// comparison document.
    pub fn get_or_create_with(
        &mut self,
        title: &str,
        make: impl FnOnce() -> Document,
    ) -> &mut Document {
        if !self.documents.contains_key(title) {
            self.put(make());
        }
        &mut self.documents[title]
    }

    pub fn remove(&mut self, title: &str) -> Result<Document, StoreError> {
        let removed = self
            .documents
            .shift_remove(title)
            .ok_or_else(|| StoreError::UnknownDocument(title.to_string()))?;
        if self.current.as_deref() == Some(title) {
            self.current = None;
        }
        Ok(removed)
    }

    pub fn current(&self) -> Option<&Document> {
        self.current
            .as_deref()
            .and_then(|title| self.documents.get(title))
    }

    pub fn current_title(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn set_current(&mut self, title: &str) -> Result<(), StoreError> {
        if !self.documents.contains_key(title) {
            return Err(StoreError::UnknownDocument(title.to_string()));
        }
        self.current = Some(title.to_string());
        Ok(())
    }

    /// Attach a new consumer. Updates published after this call are
    /// delivered in publish order until the receiver is dropped.
    pub fn subscribe(&mut self) -> Receiver<DocumentUpdate> {
        self.subscribe_with(EVENT_BUFFER_SIZE)
    }

    /// [`DocumentStore::subscribe`] with an explicit channel capacity.
    pub fn subscribe_with(&mut self, capacity: usize) -> Receiver<DocumentUpdate> {
        let (sender, receiver) = bounded(capacity);
        self.subscribers.push(sender);
        receiver
    }

    /// Publish a change notification to every live subscriber. Subscribers
    /// whose receiver has been dropped are pruned here.
    pub fn notify(&mut self, title: &str, kind: UpdateKind) {
        let update = DocumentUpdate {
            title: title.to_string(),
            kind,
        };
        debug!("Updated {}: {:?}", update.title, update.kind);
        self.subscribers
            .retain(|sender| sender.send(update.clone()).is_ok());
    }
}
