use std::collections::HashMap;

use crate::utils::errors::CalcError;
use crate::utils::types::Tag;

/// Maps logical channel names to message tags.
///
/// Tags are handed out in first-registration order and live as long as the
/// registry; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Tag>,
    next: Tag,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every name in `names` registered, in order.
    pub fn with_channels<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut registry = Self::new();
        for name in names {
            registry.register(name);
        }
        registry
    }

    /// Returns the existing tag for `name` or assigns the next one.
    pub fn register(&mut self, name: &str) -> Tag {
        if let Some(&tag) = self.tags.get(name) {
            return tag;
        }
        let tag = self.next;
        self.tags.insert(name.to_string(), tag);
        self.next += 1;
        tag
    }

    pub fn tag(&self, name: &str) -> Result<Tag, CalcError> {
        self.tags
            .get(name)
            .copied()
            .ok_or_else(|| CalcError::UnregisteredChannel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
