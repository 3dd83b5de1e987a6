//! The nodes configuration record: a versioned, immutable description of
//! cluster membership, plus the declarative update applied to it and the codec
//! used to store it.

mod codec;
mod nodes_configuration;
mod roles;
mod update;
mod version;

pub use codec::*;
pub use nodes_configuration::*;
pub use roles::*;
pub use update::*;
pub use version::*;
