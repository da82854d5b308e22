//! Positional per-component state.
//!
//! Every component invocation runs inside a [`HookFrame`] holding the cells
//! of the fiber's alternate. The n-th `use_state` call of a render reads the
//! n-th cell of the previous render, so hook calls must happen in the same
//! order on every render. Calling them conditionally misattributes state
//! between cells; nothing detects it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::fiber::StateSlot;
use crate::runtime::RuntimeHandle;

type Update<T> = Rc<dyn Fn(&T) -> T>;

/// One retained value plus the updates queued against it.
///
/// A cell's value never changes after creation: the next render copies it
/// forward into a new cell and folds the queue there. A pass that is
/// abandoned and restarted therefore folds the same queue again.
pub(crate) struct StateCell<T> {
    value: T,
    queue: RefCell<Vec<Update<T>>>,
}

impl<T: Clone> StateCell<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            queue: RefCell::new(Vec::new()),
        }
    }

    fn folded(&self) -> T {
        let updates: Vec<Update<T>> = self.queue.borrow().clone();
        updates
            .iter()
            .fold(self.value.clone(), |value, update| update(&value))
    }
}

pub(crate) struct HookFrame {
    previous: Vec<StateSlot>,
    cells: Vec<StateSlot>,
    runtime: RuntimeHandle,
    component: &'static str,
}

impl HookFrame {
    pub(crate) fn new(
        previous: Vec<StateSlot>,
        runtime: RuntimeHandle,
        component: &'static str,
    ) -> Self {
        Self {
            previous,
            cells: Vec::new(),
            runtime,
            component,
        }
    }
}

thread_local! {
    static HOOK_FRAMES: RefCell<Vec<HookFrame>> = const { RefCell::new(Vec::new()) };
}

/// Runs `render` with `frame` as the active hook context and returns the
/// cells the render allocated.
pub(crate) fn with_hook_frame<R>(
    frame: HookFrame,
    render: impl FnOnce() -> R,
) -> (R, Vec<StateSlot>) {
    struct Guard {
        armed: bool,
    }
    impl Drop for Guard {
        fn drop(&mut self) {
            if self.armed {
                HOOK_FRAMES.with(|frames| {
                    frames.borrow_mut().pop();
                });
            }
        }
    }

    HOOK_FRAMES.with(|frames| frames.borrow_mut().push(frame));
    let mut guard = Guard { armed: true };
    let result = render();
    guard.armed = false;
    let cells = HOOK_FRAMES
        .with(|frames| frames.borrow_mut().pop())
        .map(|frame| frame.cells)
        .unwrap_or_default();
    (result, cells)
}

/// Whether a component render is currently on this thread's stack.
pub fn in_component_render() -> bool {
    HOOK_FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Updates a state cell and schedules a render pass.
pub struct Dispatch<T> {
    cell: Weak<StateCell<T>>,
    runtime: RuntimeHandle,
}

impl<T: 'static> Dispatch<T> {
    /// Queues `update`; it runs against the cell's value during the next
    /// render of the owning component, after every earlier queued update.
    ///
    /// The update may run more than once if a pass is abandoned, so it must
    /// be a pure function of its argument.
    pub fn update(&self, update: impl Fn(&T) -> T + 'static) {
        let Some(cell) = self.cell.upgrade() else {
            log::debug!("dispatch on a retired state cell ignored");
            return;
        };
        cell.queue.borrow_mut().push(Rc::new(update));
        self.runtime.request_render();
    }

    pub fn set(&self, value: T)
    where
        T: Clone,
    {
        self.update(move |_| value.clone());
    }

    /// Updates queued on this cell and not yet folded by a committed render.
    pub fn pending(&self) -> usize {
        self.cell
            .upgrade()
            .map_or(0, |cell| cell.queue.borrow().len())
    }
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> fmt::Debug for Dispatch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("live", &(self.cell.strong_count() > 0))
            .finish()
    }
}

pub fn use_state<T: Clone + 'static>(initial: T) -> (T, Dispatch<T>) {
    use_state_with(move || initial)
}

/// Like [`use_state`], but only builds the initial value on the first render.
///
/// # Panics
///
/// Panics when called outside the synchronous extent of a component render.
pub fn use_state_with<T: Clone + 'static>(init: impl FnOnce() -> T) -> (T, Dispatch<T>) {
    let (index, previous, runtime, component) = HOOK_FRAMES.with(|frames| {
        let frames = frames.borrow();
        let Some(frame) = frames.last() else {
            panic!("use_state called outside of a component render");
        };
        let index = frame.cells.len();
        (
            index,
            frame.previous.get(index).cloned(),
            frame.runtime.clone(),
            frame.component,
        )
    });

    // User code (init, queued updates) runs with no borrow of the frame stack held.
    let value = match previous.map(downcast_cell::<T>) {
        Some(Ok(cell)) => cell.folded(),
        Some(Err(())) => {
            log::warn!(
                "state cell {index} of {component} changed type between renders; reseeding"
            );
            init()
        }
        None => init(),
    };

    let cell = Rc::new(StateCell::new(value.clone()));
    let dispatch = Dispatch {
        cell: Rc::downgrade(&cell),
        runtime,
    };
    HOOK_FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            frame.cells.push(cell as Rc<dyn Any>);
        }
    });
    (value, dispatch)
}

fn downcast_cell<T: 'static>(slot: StateSlot) -> Result<Rc<StateCell<T>>, ()> {
    slot.downcast::<StateCell<T>>().map_err(|_| ())
}

#[allow(non_snake_case)]
pub fn useState<T: Clone + 'static>(initial: T) -> (T, Dispatch<T>) {
    use_state(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DefaultScheduler, Runtime};
    use std::sync::Arc;

    fn render_two_cells(
        previous: Vec<StateSlot>,
        runtime: &Runtime,
    ) -> ((i32, String), Vec<StateSlot>) {
        let frame = HookFrame::new(previous, runtime.handle(), "Test");
        with_hook_frame(frame, || {
            let (count, _) = use_state(1);
            let (label, _) = use_state(String::from("a"));
            (count, label)
        })
    }

    #[test]
    #[should_panic(expected = "use_state called outside of a component render")]
    fn use_state_outside_render_panics() {
        let _ = use_state(0);
    }

    #[test]
    fn cells_are_matched_by_position() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let (first, cells) = render_two_cells(Vec::new(), &runtime);
        assert_eq!(first, (1, "a".to_owned()));
        assert_eq!(cells.len(), 2);

        let count = cells[0].clone().downcast::<StateCell<i32>>().unwrap();
        count.queue.borrow_mut().push(Rc::new(|c: &i32| c + 10));

        let (second, next_cells) = render_two_cells(cells.clone(), &runtime);
        assert_eq!(second, (11, "a".to_owned()));
        assert_eq!(count.value, 1, "alternate cell is never mutated");
        let next = next_cells[0].clone().downcast::<StateCell<i32>>().unwrap();
        assert!(next.queue.borrow().is_empty());
    }

    #[test]
    fn frame_is_popped_when_render_panics() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let frame = HookFrame::new(Vec::new(), runtime.handle(), "Boom");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_hook_frame(frame, || panic!("render failed"))
        }));
        assert!(result.is_err());
        assert!(!in_component_render());
    }

    #[test]
    fn retired_dispatch_is_a_no_op() {
        let runtime = Runtime::new(Arc::new(DefaultScheduler));
        let frame = HookFrame::new(Vec::new(), runtime.handle(), "Test");
        let (dispatch, cells) = with_hook_frame(frame, || use_state(5).1);
        drop(cells);
        dispatch.update(|v| v + 1);
        assert_eq!(dispatch.pending(), 0);
        assert!(!runtime.has_render_request());
    }
}
