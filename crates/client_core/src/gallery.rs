use chrono::{DateTime, Utc};
use shared::domain::{bare_identifier, Asset};

use crate::{Completion, RequestSequence, RequestToken, WorkflowError};

/// Number of assets shown in the "latest results" preview next to the editor.
pub const PREVIEW_LIMIT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    token: RequestToken,
}

/// Read-through cache of the asset store. The list is only ever replaced as a whole.
#[derive(Debug, Default)]
pub struct AssetGallery {
    assets: Vec<Asset>,
    refreshed_at: Option<DateTime<Utc>>,
    refreshes: RequestSequence,
    last_error: Option<WorkflowError>,
}

impl AssetGallery {
    pub fn begin_refresh(&mut self) -> RefreshTicket {
        RefreshTicket {
            token: self.refreshes.issue(),
        }
    }

    /// Applies the newest refresh only. A failed refresh keeps the previous list and records the
    /// error.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<Asset>, WorkflowError>,
    ) -> Completion {
        if !self.refreshes.is_current(ticket.token) {
            return Completion::Stale;
        }
        match result {
            Ok(assets) => {
                self.assets = assets;
                self.refreshed_at = Some(Utc::now());
                self.last_error = None;
            }
            Err(err) => self.last_error = Some(err),
        }
        Completion::Applied
    }

    /// Full gallery view, unfiltered and untruncated.
    pub fn all(&self) -> &[Asset] {
        &self.assets
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn last_error(&self) -> Option<&WorkflowError> {
        self.last_error.as_ref()
    }

    /// Assets whose name contains the extension-stripped `identifier`, in store order, capped at
    /// [`PREVIEW_LIMIT`]. Without an identifier the newest assets are returned unfiltered.
    pub fn filtered_for(&self, identifier: Option<&str>) -> Vec<Asset> {
        let needle = identifier.map(bare_identifier);
        self.assets
            .iter()
            .filter(|asset| needle.map_or(true, |needle| asset.name.contains(needle)))
            .take(PREVIEW_LIMIT)
            .cloned()
            .collect()
    }
}
