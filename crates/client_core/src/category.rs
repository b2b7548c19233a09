use shared::domain::Category;

/// Holds the active category. Side effects of a change (session reset, style reset, registry
/// reload) belong to the orchestrator; the selector only reports whether a change happened.
#[derive(Debug, Clone)]
pub struct CategorySelector {
    active: Category,
}

impl CategorySelector {
    pub fn new(initial: Category) -> Self {
        Self { active: initial }
    }

    pub fn active(&self) -> Category {
        self.active
    }

    /// Returns the previously active category when the selection changed, `None` otherwise.
    pub fn select(&mut self, category: Category) -> Option<Category> {
        if self.active == category {
            return None;
        }
        Some(std::mem::replace(&mut self.active, category))
    }
}

impl Default for CategorySelector {
    fn default() -> Self {
        Self::new(Category::default())
    }
}
