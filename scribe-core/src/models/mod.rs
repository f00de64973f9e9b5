pub mod capture;
pub mod template;

pub use capture::{Capture, GeneratedNote};
pub use template::Template;
