use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Final-flush hook implemented by plot front types
pub trait PlotLifecycle {
    /// Emits whatever is pending, ignoring the rate limit
    fn final_flush(&mut self);
}

/// Host-driven lifecycle registry for active plots
///
/// An interactive host (a notebook kernel hook firing when a cell
/// finishes, a training callback's teardown) registers every plot the
/// session touched and calls `close_all` at the end, so the last
/// observations always reach the renderer. The registry is an explicit
/// object the host owns and passes around, deliberately not process-wide
/// mutable state.
#[derive(Default)]
pub struct PlotRegistry {
    active: Vec<Arc<Mutex<dyn PlotLifecycle + Send>>>,
}

impl PlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plot for the next `close_all`
    ///
    /// Re-registering the same plot is a no-op, a plot flushes once per
    /// cycle no matter how many updates it received.
    pub fn register(&mut self, plot: Arc<Mutex<dyn PlotLifecycle + Send>>) {
        if self.active.iter().any(|known| Arc::ptr_eq(known, &plot)) {
            return;
        }

        self.active.push(plot);
    }

    /// Flushes every registered plot once and empties the registry
    pub fn close_all(&mut self) {
        for plot in self.active.drain(..) {
            plot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .final_flush();
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl fmt::Debug for PlotRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlotRegistry")
            .field("active", &self.active.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FlushProbe {
        flushes: usize,
    }

    impl PlotLifecycle for FlushProbe {
        fn final_flush(&mut self) {
            self.flushes += 1;
        }
    }

    fn probe() -> Arc<Mutex<FlushProbe>> {
        Arc::new(Mutex::new(FlushProbe::default()))
    }

    #[test]
    fn flushes_each_registered_plot_once() {
        let mut registry = PlotRegistry::new();
        let (one, two) = (probe(), probe());

        registry.register(one.clone());
        registry.register(two.clone());
        registry.close_all();

        assert_eq!(one.lock().unwrap().flushes, 1);
        assert_eq!(two.lock().unwrap().flushes, 1);
    }

    #[test]
    fn ignores_duplicate_registration() {
        let mut registry = PlotRegistry::new();
        let plot = probe();

        registry.register(plot.clone());
        registry.register(plot.clone());

        assert_eq!(registry.len(), 1);

        registry.close_all();
        assert_eq!(plot.lock().unwrap().flushes, 1);
    }

    #[test]
    fn empties_registry_after_close_all() {
        let mut registry = PlotRegistry::new();
        let plot = probe();
        registry.register(plot.clone());

        registry.close_all();
        registry.close_all();

        assert!(registry.is_empty());
        assert_eq!(plot.lock().unwrap().flushes, 1, "second cycle has no plots");
    }
}
