use lazy_static::lazy_static;
use std::sync::RwLock;
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref LABEL_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a label and return its dense id. Feedback text, block
/// summaries and instructions go through here so the renderer can key
/// its text-pixmap cache by atom instead of re-rendering strings.
pub fn intern_label(s: &str) -> usize {
    let atom = Atom::from(s);
    let mut v = LABEL_INTERNER.write().unwrap();
    match v.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            v.push(atom);
            v.len() - 1
        }
    }
}

/// Current count of unique labels.
pub fn label_count() -> usize {
    LABEL_INTERNER.read().unwrap().len()
}

pub fn label_text(id: usize) -> String {
    LABEL_INTERNER.read().unwrap()[id].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = intern_label("sct interner test label");
        let b = intern_label("sct interner test label");
        assert_eq!(a, b);
        assert_eq!(label_text(a), "sct interner test label");
        assert!(label_count() > a);
    }
}
