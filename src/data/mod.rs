//! Identifiers, the data repository and the data shapes stored in it.

pub mod filters;
pub mod identifier;
pub mod labels;
pub mod periods;
pub mod repository;
pub mod table;

pub use identifier::{Identifier, IdentifierKind, Period};
pub use repository::{Data, DataRepository, Entry, Metadata};
pub use table::{Cell, Table, TIME_COLUMN};
