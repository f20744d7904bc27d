//! Entity implementation

slotmap::new_key_type! {
    /// Generational entity identifier; stale ids never alias new entities
    pub struct Entity;
}
