//! Creation-event trigger.
//!
//! Each new document in the watched collection gets its own task, so
//! handlers for different documents run concurrently and share nothing.
//! Delivery is at-least-once from the handler's point of view: handlers must
//! be idempotent.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::store::{Document, DocumentStore};

/// Invoke `handler` once per document created in `collection`.
///
/// The subscription is taken before this returns, so every commit after the
/// call is observed. Handler errors are logged and do not stop the listener.
pub fn on_create<F, Fut, E>(store: &dyn DocumentStore, collection: &str, handler: F) -> JoinHandle<()>
where
    F: Fn(Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut rx = store.subscribe();
    let collection = collection.to_string();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(created) if created.collection == collection => {
                    let handler = Arc::clone(&handler);
                    let collection = collection.clone();
                    let document_id = created.document.id.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handler(created.document).await {
                            error!(%collection, %document_id, error = %e, "Create handler failed");
                        }
                    });
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(%collection, missed, "Creation notifications dropped; a sweep will pick them up");
                }
                Err(RecvError::Closed) => {
                    debug!(%collection, "Store closed, stopping trigger");
                    break;
                }
            }
        }
    })
}
