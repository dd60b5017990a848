pub mod cache;

pub use cache::{intern_label, label_count, label_text, Atom};
