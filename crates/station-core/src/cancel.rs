//! Cooperative cancellation signal.
//!
//! A [`CancelToken`] wraps a `tokio::sync::watch` flag. Child tokens observe
//! their parent, so cancelling a sequence also cancels the step currently
//! running under it, while cancelling a child leaves the parent untouched.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
    parent: Option<Box<CancelToken>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: Arc::new(tx),
            parent: None,
        }
    }

    /// Create a token that is cancelled whenever `self` is.
    pub fn child_token(&self) -> CancelToken {
        let (tx, _rx) = watch::channel(false);
        CancelToken {
            flag: Arc::new(tx),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    /// True if both handles refer to the same token.
    pub fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }

    /// True if this token or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        let own = *self.flag.borrow();
        own || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Resolve once this token or any ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.flag.subscribe();
            let own = async move {
                loop {
                    let cancelled = *rx.borrow_and_update();
                    if cancelled {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        futures::future::pending::<()>().await;
                    }
                }
            };
            match &self.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        })
    }
}
