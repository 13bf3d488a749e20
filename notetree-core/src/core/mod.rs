//! Internal domain modules for the Notetree core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod config;
pub mod delete;
pub mod error;
pub mod integrity;
pub mod moves;
pub mod normalize;
pub mod note;
pub mod order;
pub mod storage;
pub mod tree;

#[doc(inline)]
pub use config::EngineConfig;
#[doc(inline)]
pub use delete::DeleteResult;
#[doc(inline)]
pub use error::{NoteTreeError, Result};
#[doc(inline)]
pub use integrity::IntegrityIssue;
#[doc(inline)]
pub use normalize::{NormalizeResult, NormalizeScope};
#[doc(inline)]
pub use note::{Note, OrderEntry, Project};
#[doc(inline)]
pub use order::create_order_entry;
#[doc(inline)]
pub use storage::Storage;
#[doc(inline)]
pub use tree::NoteTree;
