//! # Gantry XML-RPC
//!
//! A carrier bridging gantry ports to XML-RPC peers. Messages convert
//! to and from method calls: element 0 names the method, the rest
//! become positional parameters, and replies come back as message
//! text. The carrier's header is the start of the HTTP request line,
//! so a port can serve XML-RPC and native carriers on one listener.
//!
//! Two registrations of the same machinery:
//!
//! | Name | Mode |
//! |--------|------|
//! | xmlrpc | plain bridge, no message discrimination |
//! | rosrpc | ROS interop; node bookkeeping calls are flagged admin |

pub mod carrier;
pub mod document;
pub mod value;

pub use carrier::{XmlRpcCarrier, ADMIN_CALLS};
pub use document::{Document, ParseStatus};
pub use value::RpcValue;
