//! Backend implementations of the storage contract.
//!
//! Each backend implements [`DocumentStore`](crate::store::DocumentStore) and
//! provides a [`WriteBatch`](crate::store::WriteBatch):
//!
//! | Backend | Module | Commit semantics |
//! |---------|--------|------------------|
//! | Firestore `documents:commit` | [`commit`] | Atomic per batch |
//! | Firestore per-document `PATCH` | [`patch`] | One request per update, not atomic |
//! | In-process maps | [`memory`] | Atomic per batch, used by tests |

pub mod commit;
pub mod memory;
pub mod patch;

pub use commit::CommitStore;
pub use memory::MemoryStore;
pub use patch::PatchStore;
