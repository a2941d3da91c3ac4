use gl_generator::{Api, Fallbacks, Profile, Registry, StructGenerator};
use std::env;
use std::fs::File;
use std::path::Path;

fn main() {
    let dest = env::var("OUT_DIR").unwrap();
    let mut file = File::create(Path::new(&dest).join("gl_bindings.rs")).unwrap();

    Registry::new(
        Api::Gl,
        (3, 3),
        Profile::Core,
        Fallbacks::All,
        [
            "GL_EXT_texture_compression_s3tc",
            "GL_ARB_texture_mirror_clamp_to_edge",
        ],
    )
    .write_bindings(StructGenerator, &mut file)
    .unwrap();
}
