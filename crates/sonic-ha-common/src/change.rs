//! Change notifications delivered by the hierarchical store.

use crate::{HaError, HaResult, Partition, Record, RecordIdentity};

/// Modification type as reported by the store for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationKind {
    /// The record was written as a whole (create or replace).
    Write,
    /// Some child of the record changed.
    SubtreeModified,
    /// The record was removed.
    Delete,
}

impl ModificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModificationKind::Write => "WRITE",
            ModificationKind::SubtreeModified => "SUBTREE_MODIFIED",
            ModificationKind::Delete => "DELETE",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ModificationKind::Delete)
    }
}

/// Listener-facing view of a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

/// Before and after images of a single record plus its modification type.
///
/// `kind` is `None` when the store could not report a modification type;
/// such a modification fails [`Modification::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub kind: Option<ModificationKind>,
    pub before: Option<Record>,
    pub after: Option<Record>,
}

impl Modification {
    /// A whole-record write; `before` is `None` for a create.
    pub fn write(before: Option<Record>, after: Record) -> Self {
        Self {
            kind: Some(ModificationKind::Write),
            before,
            after: Some(after),
        }
    }

    pub fn subtree_modified(before: Record, after: Record) -> Self {
        Self {
            kind: Some(ModificationKind::SubtreeModified),
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(before: Option<Record>) -> Self {
        Self {
            kind: Some(ModificationKind::Delete),
            before,
            after: None,
        }
    }

    /// A modification whose type could not be read from the store.
    pub fn unclassified(before: Option<Record>, after: Option<Record>) -> Self {
        Self {
            kind: None,
            before,
            after,
        }
    }

    /// Returns the after image if present, otherwise the before image.
    pub fn record(&self) -> Option<&Record> {
        self.after.as_ref().or(self.before.as_ref())
    }

    /// Returns true if the record exists before and after with the same value.
    pub fn is_noop(&self) -> bool {
        self.before.is_some() && self.before == self.after
    }

    /// Validates the modification type against the before/after images.
    pub fn classify(&self) -> HaResult<ModificationKind> {
        let identity = || {
            self.record()
                .map(|r| r.identity().to_string())
                .unwrap_or_else(|| "<unknown>".to_string())
        };

        let kind = self
            .kind
            .ok_or_else(|| HaError::unclassifiable(identity(), "modification type unavailable"))?;

        match kind {
            ModificationKind::Write if self.after.is_none() => Err(HaError::unclassifiable(
                identity(),
                "WRITE without an after image",
            )),
            ModificationKind::SubtreeModified if self.after.is_none() || self.before.is_none() => {
                Err(HaError::unclassifiable(
                    identity(),
                    "SUBTREE_MODIFIED without both images",
                ))
            }
            ModificationKind::Delete if self.after.is_some() => Err(HaError::unclassifiable(
                identity(),
                "DELETE with an after image",
            )),
            kind => Ok(kind),
        }
    }

    /// Classifies the modification as add, update or delete.
    pub fn change_kind(&self) -> HaResult<ChangeKind> {
        Ok(match self.classify()? {
            ModificationKind::Delete => ChangeKind::Delete,
            _ if self.before.is_none() => ChangeKind::Add,
            _ => ChangeKind::Update,
        })
    }
}

/// A change to one record in one partition, as delivered by a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChange {
    pub partition: Partition,
    pub identity: RecordIdentity,
    pub modification: Modification,
}

impl DataChange {
    pub fn new(partition: Partition, identity: RecordIdentity, modification: Modification) -> Self {
        Self {
            partition,
            identity,
            modification,
        }
    }

    pub fn add(partition: Partition, record: Record) -> Self {
        Self::new(partition, record.identity(), Modification::write(None, record))
    }

    pub fn update(partition: Partition, before: Record, after: Record) -> Self {
        Self::new(
            partition,
            after.identity(),
            Modification::write(Some(before), after),
        )
    }

    pub fn delete(partition: Partition, record: Record) -> Self {
        Self::new(partition, record.identity(), Modification::delete(Some(record)))
    }
}
