//! The consumer ends of the processing pipeline: the update watcher that
//! drains the document store's event channel, and the project writer.

use std::io;

use crossbeam_channel::Receiver;
use indexmap::IndexMap;
use tracing::{debug, info};

use origami_core::document::Document;
use origami_core::store::DocumentUpdate;

/// Drain document updates until every publisher is gone, reporting
/// progress at a coarse cadence. Returns the number of updates seen.
pub fn watch_updates(receiver: Receiver<DocumentUpdate>) -> usize {
    let mut count = 0usize;
    let mut checkpoint = 0usize;
    while let Ok(update) = receiver.recv() {
        count += 1;
        debug!("Updated {}: {:?}", update.title, update.kind);
        if count - checkpoint >= 100 {
            info!("Applied {count} document updates");
            checkpoint = count;
        }
    }
    count
}

/// Serialize every registered document as one JSON object keyed by title,
/// the on-disk project format.
pub fn write_documents<W: io::Write>(
    writer: W,
    documents: &IndexMap<String, Document>,
    pretty: bool,
) -> serde_json::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(writer, documents)
    } else {
        serde_json::to_writer(writer, documents)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::bounded;
    use origami_core::document::DocumentKind;
    use origami_core::store::UpdateKind;

    #[test]
    fn test_watcher_counts_until_disconnect() {
        let (sender, receiver) = bounded(8);
        let task = std::thread::spawn(move || watch_updates(receiver));
        for _ in 0..3 {
            sender
                .send(DocumentUpdate {
                    title: "run".into(),
                    kind: UpdateKind::Document,
                })
                .unwrap();
        }
        drop(sender);
        assert_eq!(task.join().unwrap(), 3);
    }

    #[test]
    fn test_write_documents_round_trips() {
        let mut documents = IndexMap::new();
        documents.insert(
            "run".to_string(),
            Document::new("run", "run.mzML", DocumentKind::Origami),
        );
        let mut buffer = Vec::new();
        write_documents(&mut buffer, &documents, false).unwrap();
        let back: IndexMap<String, Document> = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back["run"].title, "run");
        assert_eq!(back["run"].kind, DocumentKind::Origami);
    }
}
