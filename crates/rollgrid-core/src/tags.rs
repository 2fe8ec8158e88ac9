//! Tag capability for inventory records.

/// Something that carries free-form operator tags.
pub trait Tagged {
    fn tags(&self) -> &[String];

    /// Case-insensitive tag membership.
    fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// True when every tag in `wanted` is present.
    fn has_all_tags(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|t| self.has_tag(t))
    }
}
