//! Multi-row selection scoped to the visible rows

use std::collections::BTreeSet;

use serde::Serialize;

/// Header checkbox state for the visible rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectAllState {
    Unchecked,
    Indeterminate,
    Checked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<i64>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn toggle(&mut self, id: i64) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    pub fn select(&mut self, id: i64) {
        self.ids.insert(id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.ids.iter().copied().collect()
    }

    /// Header state relative to the currently visible rows
    pub fn state_for(&self, visible: &[i64]) -> SelectAllState {
        let selected = visible.iter().filter(|id| self.ids.contains(id)).count();
        if selected == 0 {
            SelectAllState::Unchecked
        } else if selected == visible.len() {
            SelectAllState::Checked
        } else {
            SelectAllState::Indeterminate
        }
    }

    /// Header checkbox click: select every visible row, or clear them if all are selected
    ///
    /// Rows hidden by the current filter keep their selection.
    pub fn toggle_all(&mut self, visible: &[i64]) {
        if self.state_for(visible) == SelectAllState::Checked {
            for id in visible {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(visible.iter().copied());
        }
    }

    /// Drop ids no longer present in the canonical list
    pub fn retain_existing(&mut self, existing: &BTreeSet<i64>) {
        self.ids.retain(|id| existing.contains(id));
    }
}
