//! Session identifiers, naming schemes and KCNI/Datman conversion

pub mod converter;
pub mod mapping;
pub mod scheme;

pub use converter::{convert, IdConverter};
pub use mapping::{IdMapping, SubjectRule, SubjectRules};
pub use scheme::{Direction, IdScheme, ScanId};
