//! Classification of proposed child rows into insert, update and delete sets

use std::collections::HashSet;

use crate::types::*;

/// The computed difference between persisted and proposed rows of one kind
///
/// The three buckets are pairwise disjoint: a row is inserted, updated or
/// deleted, never more than one of those.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildDiff {
    /// Kind the diff applies to
    pub kind: ChildKind,
    /// Payloads for rows to be created under the plan
    pub to_insert: Vec<ChildFields>,
    /// Identity and replacement payload for rows to be updated
    pub to_update: Vec<(ChildId, ChildFields)>,
    /// Identities of rows to be removed
    pub to_delete: Vec<ChildId>,
}

impl ChildDiff {
    /// An empty diff for the given kind
    pub fn empty(kind: ChildKind) -> Self {
        Self {
            kind,
            to_insert: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    /// Whether applying this diff would change nothing structurally
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Compute the insert/update/delete sets bringing `persisted` in line with `proposed`
///
/// Kinds without a selection flag (subscription terms) treat the proposed list
/// as the complete desired end state: persisted rows whose identity is not
/// held by any proposed row are deleted. Kinds with a selection flag (charge
/// rules, feature flags) are checklists: each proposed row states whether it
/// should exist, and persisted rows not mentioned are left untouched.
///
/// A proposed row carrying a nonzero identity must be a member of `persisted`;
/// an unknown identity means the row vanished (or belongs to another plan)
/// between read and submit and is reported as a concurrent modification.
pub fn diff_children(
    kind: ChildKind,
    persisted: &[PersistedChild],
    proposed: &[ProposedChild],
) -> BillingResult<ChildDiff> {
    let persisted_ids: HashSet<ChildId> = persisted.iter().map(|c| c.id).collect();
    let mut held: HashSet<ChildId> = HashSet::new();
    let mut seen: HashSet<ChildId> = HashSet::new();
    let mut diff = ChildDiff::empty(kind);

    for row in proposed {
        if row.fields.kind() != kind {
            return Err(BillingError::Validation(format!(
                "Payload of kind {} submitted under {}",
                row.fields.kind(),
                kind
            )));
        }

        // An explicit zero identity means "new", same as no identity at all.
        let id = row.id.filter(|id| *id != 0);

        if let Some(id) = id {
            if !seen.insert(id) {
                return Err(BillingError::Validation(format!(
                    "Identity {id} appears more than once in the proposed {kind} list"
                )));
            }
            if !persisted_ids.contains(&id) {
                return Err(BillingError::ConcurrentModification(format!(
                    "{kind} {id} is not among the persisted rows of this plan"
                )));
            }
        }

        if kind.uses_selection() {
            let selected = row.selected.ok_or_else(|| {
                BillingError::Validation(format!("Missing selection flag on proposed {kind} row"))
            })?;
            match (selected, id) {
                (true, None) => diff.to_insert.push(row.fields.clone()),
                (true, Some(id)) => {
                    held.insert(id);
                    diff.to_update.push((id, row.fields.clone()));
                }
                (false, Some(id)) => diff.to_delete.push(id),
                // Never persisted and not wanted: nothing to do.
                (false, None) => {}
            }
        } else {
            if row.selected.is_some() {
                return Err(BillingError::Validation(format!(
                    "Selection flag is not accepted on {kind} rows"
                )));
            }
            match id {
                None => diff.to_insert.push(row.fields.clone()),
                Some(id) => {
                    held.insert(id);
                    diff.to_update.push((id, row.fields.clone()));
                }
            }
        }
    }

    // Orphan pass: rows the caller dropped from a complete-list kind.
    if !kind.uses_selection() {
        diff.to_delete.extend(
            persisted
                .iter()
                .map(|c| c.id)
                .filter(|id| !held.contains(id)),
        );
    }

    Ok(diff)
}
