//! FlatImage shared types
//!
//! Common constants, path layout, error hierarchy and portal wire schema
//! shared by the `flatimage` core library, the `flatimage-cli` binary, and
//! every standalone helper binary (`fim_boot`, `fim_janitor`,
//! `fim_portal_daemon`).

pub mod constants;
pub mod errors;
pub mod layout;
pub mod transport;

pub use errors::{FlatimageError, FlatimageResult};
pub use layout::Layout;
pub use transport::Message;
