//! Host/guest IPC portal: a FIFO+JSON request protocol, not gRPC —
//! the portal is a single-request-per-FIFO-pair protocol between two
//! processes on the same machine, not a service mesh.

pub mod daemon;
pub mod dispatcher;
pub mod fifo;
pub mod worker;

pub use flatimage_shared::transport::{Message, Mode};
