use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::IdleScheduler;

struct RuntimeInner {
    scheduler: Arc<dyn IdleScheduler>,
    render_requested: Cell<bool>,
    slice_requests: Cell<u64>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            scheduler,
            render_requested: Cell::new(false),
            slice_requests: Cell::new(0),
        }
    }

    fn request_idle_slice(&self) {
        self.slice_requests.set(self.slice_requests.get() + 1);
        self.scheduler.request_idle_slice();
    }

    fn request_render(&self) {
        self.render_requested.set(true);
        self.request_idle_slice();
    }
}

/// Shared state between an engine and the [`Dispatch`](crate::Dispatch)
/// handles its components hand out.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn has_render_request(&self) -> bool {
        self.inner.render_requested.get()
    }

    pub(crate) fn take_render_request(&self) -> bool {
        self.inner.render_requested.replace(false)
    }

    pub fn request_idle_slice(&self) {
        self.inner.request_idle_slice();
    }

    /// Number of idle slices requested since the runtime was created.
    pub fn slice_requests(&self) -> u64 {
        self.inner.slice_requests.get()
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl IdleScheduler for DefaultScheduler {
    fn request_idle_slice(&self) {}
}

#[derive(Clone)]
pub struct RuntimeHandle(pub(crate) Weak<RuntimeInner>);

impl RuntimeHandle {
    /// Asks for a fresh render pass rooted at the committed tree.
    pub fn request_render(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_render();
        }
    }

    pub fn request_idle_slice(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.request_idle_slice();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl IdleScheduler for Counting {
        fn request_idle_slice(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn render_request_sets_flag_and_asks_for_slice() {
        let scheduler = Arc::new(Counting::default());
        let runtime = Runtime::new(scheduler.clone());
        let handle = runtime.handle();

        handle.request_render();
        assert!(runtime.has_render_request());
        assert_eq!(scheduler.0.load(Ordering::SeqCst), 1);
        assert!(runtime.take_render_request());
        assert!(!runtime.has_render_request());
    }

    #[test]
    fn handle_outliving_runtime_is_inert() {
        let handle = Runtime::new(Arc::new(DefaultScheduler)).handle();
        assert!(!handle.is_alive());
        handle.request_render();
    }
}
