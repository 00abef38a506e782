pub mod geodesy;
pub mod node;
pub mod snapshot;

pub use geodesy::Eci;
pub use node::*;
pub use snapshot::*;
