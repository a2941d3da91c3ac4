/// Stable call-site tag attached to every command header.
///
/// Tags survive for the life of the program (all fields are `'static`) so the
/// backend and the statistics layer can point back at the exact line that
/// recorded a command.
#[derive(Copy, Clone, Debug)]
pub struct Tag {
    pub file: &'static str,
    pub line: u32,
    pub description: &'static str,
}

impl Tag {
    pub const fn new(file: &'static str, line: u32, description: &'static str) -> Tag {
        Tag {
            file,
            line,
            description,
        }
    }
}

/// Builds a [`Tag`] for the current source location.
#[macro_export]
macro_rules! render_tag {
    ($description:expr) => {
        $crate::tag::Tag::new(file!(), line!(), $description)
    };
}
