use std::fmt;

use pdx_types::RecordId;

/// Monotonic per-record write counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created record.
    pub const INITIAL: Self = Self(1);

    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Encoded public record together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRecord {
    pub bytes: Vec<u8>,
    pub version: Version,
}

/// Resumable position in the change feed: the number of record creations
/// already delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checkpoint(u64);

impl Checkpoint {
    /// Start of the ledger.
    pub const GENESIS: Self = Self(0);

    pub const fn new(position: u64) -> Self {
        Self(position)
    }

    pub fn position(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One delivery from the change feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    /// Checkpoint to resume from after this item has been processed.
    pub checkpoint: Checkpoint,
    pub id: RecordId,
    pub record: StoredRecord,
}

/// A single write inside a [`Transaction`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Create a public record. Fails if the id is taken.
    CreatePublic { id: RecordId, bytes: Vec<u8> },
    /// Rewrite an existing public record, optionally only if it is still at
    /// `expected`.
    UpdatePublic {
        id: RecordId,
        bytes: Vec<u8>,
        expected: Option<Version>,
    },
    /// Store a confidential payload.
    PutPrivate { id: RecordId, bytes: Vec<u8> },
    /// Remove a confidential payload; absent payloads are ignored.
    DeletePrivate { id: RecordId },
}

impl WriteOp {
    pub fn id(&self) -> &RecordId {
        match self {
            Self::CreatePublic { id, .. }
            | Self::UpdatePublic { id, .. }
            | Self::PutPrivate { id, .. }
            | Self::DeletePrivate { id } => id,
        }
    }
}

/// A batch of writes committed atomically.
///
/// The transaction id is assigned by the store when the transaction begins.
/// A record created by the transaction is stored under that id, so callers
/// know the id of a new record before committing and can reference it from
/// other writes in the same batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    id: RecordId,
    writes: Vec<WriteOp>,
}

impl Transaction {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            writes: Vec::new(),
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// Create the public record keyed by this transaction's id.
    pub fn create_public(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.writes.push(WriteOp::CreatePublic {
            id: self.id.clone(),
            bytes,
        });
        self
    }

    pub fn update_public(
        &mut self,
        id: RecordId,
        bytes: Vec<u8>,
        expected: Option<Version>,
    ) -> &mut Self {
        self.writes.push(WriteOp::UpdatePublic {
            id,
            bytes,
            expected,
        });
        self
    }

    pub fn put_private(&mut self, id: RecordId, bytes: Vec<u8>) -> &mut Self {
        self.writes.push(WriteOp::PutPrivate { id, bytes });
        self
    }

    pub fn delete_private(&mut self, id: RecordId) -> &mut Self {
        self.writes.push(WriteOp::DeletePrivate { id });
        self
    }

    pub fn writes(&self) -> &[WriteOp] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_parts(self) -> (RecordId, Vec<WriteOp>) {
        (self.id, self.writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version::INITIAL < Version::INITIAL.next());
        assert_eq!(Version::new(4).next().get(), 5);
        assert_eq!(format!("{}", Version::new(3)), "v3");
    }

    #[test]
    fn create_uses_transaction_id() {
        let mut txn = Transaction::new(RecordId::new("tx-1"));
        txn.create_public(b"{}".to_vec())
            .put_private(RecordId::new("tx-1"), b"{}".to_vec());
        assert_eq!(txn.writes().len(), 2);
        assert_eq!(txn.writes()[0].id(), &RecordId::new("tx-1"));
        assert!(matches!(txn.writes()[0], WriteOp::CreatePublic { .. }));
    }

    #[test]
    fn empty_transaction() {
        let txn = Transaction::new(RecordId::new("tx-2"));
        assert!(txn.is_empty());
        let (id, writes) = txn.into_parts();
        assert_eq!(id, RecordId::new("tx-2"));
        assert!(writes.is_empty());
    }

    #[test]
    fn checkpoint_display() {
        assert_eq!(Checkpoint::GENESIS.position(), 0);
        assert_eq!(format!("{}", Checkpoint::new(12)), "#12");
    }
}
