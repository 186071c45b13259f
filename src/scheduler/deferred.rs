use std::fmt;

/// DeferredAction holds work the caller has to run once it released its locks. The action runs
/// exactly once: on `fire()`, or on drop if it was never fired.
#[must_use = "dropping a DeferredAction runs it immediately"]
pub struct DeferredAction {
    action: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl DeferredAction {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        DeferredAction {
            action: Some(Box::new(action)),
        }
    }

    pub fn fire(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Drop for DeferredAction {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for DeferredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeferredAction(pending: {})", self.action.is_some())
    }
}
