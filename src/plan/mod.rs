//! Plan module containing child-collection diffing and transactional reconciliation

pub mod diff;
pub mod reconciler;

pub use diff::*;
pub use reconciler::*;
