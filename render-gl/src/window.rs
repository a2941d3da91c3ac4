use std::os::raw::c_void;

/// Platform side of the backend: context ownership and presentation.
///
/// Windowing and context creation live outside this crate; the backend only
/// needs a context it can make current, a symbol loader, and a way to
/// present. Implementations wrap whatever the platform layer uses (SDL,
/// glutin, EGL, ...).
pub trait PlatformWindow: Send {
    /// Creates the GL context (or makes an existing one current) on the
    /// calling thread. Returning false aborts backend initialization.
    fn acquire_context(&mut self) -> bool;

    /// Resolves a GL entry point by name.
    fn get_proc_address(&self, name: &str) -> *const c_void;

    /// Presents the back buffer.
    fn swap_buffers(&mut self);
}
