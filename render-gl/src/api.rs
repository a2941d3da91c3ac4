//! Generated OpenGL 3.3 core bindings (struct style).

#![allow(clippy::all)]
#![allow(non_upper_case_globals)]
#![allow(non_snake_case)]
#![allow(non_camel_case_types)]
#![allow(unused_imports)]
#![allow(missing_debug_implementations)]

include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
