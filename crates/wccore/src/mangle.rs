//! Name mangling — spec.md §4.4.
//!
//! WebAssembly export/import names tolerate far fewer punctuation
//! characters than the surface language's namespaced identifiers, so every
//! name the backend writes into the module goes through [`sanitize`]
//! first. The fixed meta-symbol templates (`_meta_instance_<name>`, etc.)
//! live here rather than inline in `backend` so the exact template string
//! is defined in one place and reused by both the emitter and tests.

/// Replaces every `/ . | @ -` with `_`, per spec.md §4.4.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '.' | '|' | '@' | '-') { '_' } else { c })
        .collect()
}

/// Namespaces are flattened to prefixed names (spec.md §4.3 "Namespaces are
/// lowered to prefixed names; nested namespaces are flattened").
pub fn flatten_namespace_path(segments: &[&str]) -> String {
    sanitize(&segments.join("_"))
}

pub fn instance_meta_symbol(class_name: &str) -> String {
    format!("_meta_instance_{}", sanitize(class_name))
}

pub fn class_meta_symbol(class_name: &str) -> String {
    format!("_meta_class_{}", sanitize(class_name))
}

pub fn instance_members_symbol(class_name: &str) -> String {
    format!("_meta_instance_members_{}", sanitize(class_name))
}

pub fn enum_entry_symbol(entry_name: &str) -> String {
    format!("_enum_entry_{}", sanitize(entry_name))
}

pub fn synthetic_label(index: u32) -> String {
    format!("_L{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_every_reserved_character() {
        assert_eq!(sanitize("Math|sqrt"), "Math_sqrt");
        assert_eq!(sanitize("a.b/c@d-e"), "a_b_c_d_e");
    }

    #[test]
    fn meta_symbol_templates_match_spec() {
        assert_eq!(instance_meta_symbol("Foo"), "_meta_instance_Foo");
        assert_eq!(class_meta_symbol("Foo"), "_meta_class_Foo");
        assert_eq!(instance_members_symbol("Foo"), "_meta_instance_members_Foo");
        assert_eq!(enum_entry_symbol("Red"), "_enum_entry_Red");
        assert_eq!(synthetic_label(3), "_L3");
    }
}
