//! Process-wide handler for failures nobody else can receive
//!
//! A managed thread whose target panics or trips a translated signal has
//! no caller to return the error to at that moment. The thread entry
//! trampoline reports such failures here before signaling completion, so
//! they are never silently swallowed. Joiners still get the error from
//! `join()`.

use std::sync::{Arc, RwLock};

use crate::error::CoreError;

/// Receiver of uncaught thread failures
pub trait ErrorHandler: Send + Sync {
    /// Called on the failing thread, after the target has unwound
    fn handle(&self, thread_name: &str, error: &CoreError);
}

/// Logs the failure at error level
#[derive(Debug, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, thread_name: &str, error: &CoreError) {
        crate::kerror!("unhandled failure in thread '{}': {}", thread_name, error);
    }
}

static HANDLER: RwLock<Option<Arc<dyn ErrorHandler>>> = RwLock::new(None);

/// Install `handler`, returning the previously installed one
pub fn set_error_handler(handler: Arc<dyn ErrorHandler>) -> Arc<dyn ErrorHandler> {
    let mut slot = match HANDLER.write() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    slot.replace(handler)
        .unwrap_or_else(|| Arc::new(DefaultErrorHandler))
}

/// Currently installed handler
pub fn error_handler() -> Arc<dyn ErrorHandler> {
    let slot = match HANDLER.read() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    match slot.as_ref() {
        Some(h) => Arc::clone(h),
        None => Arc::new(DefaultErrorHandler),
    }
}

/// Report `error` to the installed handler
pub fn handle_error(thread_name: &str, error: &CoreError) {
    // Handler runs outside the lock so it may itself replace the handler
    let handler = error_handler();
    handler.handle(thread_name, error);
}
