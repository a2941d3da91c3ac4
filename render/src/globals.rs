//! Registry of process-wide subsystems with deterministic bring-up order.
//!
//! Subsystems register an init/fini pair; `init` runs them in registration
//! order, `fini` in reverse. Registration happens explicitly (typically at
//! the top of `main`) rather than through life-before-main tricks, so the
//! order is the order you can read in the source.

use std::sync::Mutex;

struct Global {
    name: &'static str,
    init: fn(),
    fini: fn(),
    initialized: bool,
}

static REGISTRY: Mutex<Vec<Global>> = Mutex::new(Vec::new());

pub fn register(name: &'static str, init: fn(), fini: fn()) {
    let mut registry = REGISTRY.lock().unwrap();
    assert!(
        registry.iter().all(|global| global.name != name),
        "global already registered"
    );
    registry.push(Global {
        name,
        init,
        fini,
        initialized: false,
    });
}

/// Initializes every registered global, head to tail.
pub fn init() {
    let mut registry = REGISTRY.lock().unwrap();
    for global in registry.iter_mut() {
        if !global.initialized {
            (global.init)();
            global.initialized = true;
        }
    }
}

/// Finalizes every registered global, tail to head, and empties the
/// registry.
pub fn fini() {
    let mut registry = REGISTRY.lock().unwrap();
    for global in registry.iter_mut().rev() {
        if global.initialized {
            (global.fini)();
            global.initialized = false;
        }
    }
    registry.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ORDER: AtomicUsize = AtomicUsize::new(0);
    static FIRST_INIT: AtomicUsize = AtomicUsize::new(0);
    static SECOND_INIT: AtomicUsize = AtomicUsize::new(0);
    static FIRST_FINI: AtomicUsize = AtomicUsize::new(0);
    static SECOND_FINI: AtomicUsize = AtomicUsize::new(0);

    fn stamp(slot: &AtomicUsize) {
        slot.store(ORDER.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
    }

    #[test]
    fn init_forward_fini_reverse() {
        register("first", || stamp(&FIRST_INIT), || stamp(&FIRST_FINI));
        register("second", || stamp(&SECOND_INIT), || stamp(&SECOND_FINI));

        init();
        fini();

        let first_init = FIRST_INIT.load(Ordering::SeqCst);
        let second_init = SECOND_INIT.load(Ordering::SeqCst);
        let first_fini = FIRST_FINI.load(Ordering::SeqCst);
        let second_fini = SECOND_FINI.load(Ordering::SeqCst);

        assert!(first_init < second_init);
        assert!(second_init < second_fini);
        assert!(second_fini < first_fini);
    }
}
