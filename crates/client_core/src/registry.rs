use std::collections::HashMap;

use shared::domain::Category;

use crate::{Completion, RequestSequence, RequestToken, WorkflowError};

/// Listing request issued for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingTicket {
    pub category: Category,
    token: RequestToken,
}

/// Per-category cache of document identifiers, in the order the storage backend returned them.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: HashMap<Category, Vec<String>>,
    requests: HashMap<Category, RequestSequence>,
    errors: HashMap<Category, WorkflowError>,
}

impl DocumentRegistry {
    pub fn begin_refresh(&mut self, category: Category) -> ListingTicket {
        let token = self.requests.entry(category).or_default().issue();
        ListingTicket { category, token }
    }

    pub fn is_current(&self, ticket: &ListingTicket) -> bool {
        self.requests
            .get(&ticket.category)
            .is_some_and(|requests| requests.is_current(ticket.token))
    }

    /// Replaces the cached listing wholesale. A failed listing leaves the category empty and keeps
    /// the error for diagnostics; a superseded ticket changes nothing.
    pub fn complete_refresh(
        &mut self,
        ticket: &ListingTicket,
        result: Result<Vec<String>, WorkflowError>,
    ) -> Completion {
        if !self.is_current(ticket) {
            return Completion::Stale;
        }

        match result {
            Ok(identifiers) => {
                self.entries.insert(ticket.category, identifiers);
                self.errors.remove(&ticket.category);
            }
            Err(err) => {
                self.entries.insert(ticket.category, Vec::new());
                self.errors.insert(ticket.category, err);
            }
        }
        Completion::Applied
    }

    pub fn list(&self, category: Category) -> &[String] {
        self.entries
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, category: Category, identifier: &str) -> bool {
        self.list(category).iter().any(|known| known == identifier)
    }

    pub fn last_error(&self, category: Category) -> Option<&WorkflowError> {
        self.errors.get(&category)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
