//! Serverless peer-to-peer area-of-interest management.
//!
//! Every participant runs a [`Node`] initialized with its local entity and
//! enters the network through the identifier of an already participating
//! peer, or creates a new network by joining with `None`. From then on the
//! node keeps track of all entities inside the local AOI by exchanging
//! position and topology datagrams directly with its neighbors; there is no
//! central server, and every peer relays join requests and introductions
//! for others.

pub mod config;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod node;
pub mod position;
pub mod protocol;
pub mod transport;

pub use config::NodeConfig;
pub use entity::{Entity, RemoteEntity};
pub use error::Error;
pub use identifier::Identifier;
pub use node::Node;
pub use position::{Position, QUADRANTS};
pub use protocol::{MAX_PACKET_LEN, MOVE_PACKET_LEN, NEIGHBOR_PACKET_LEN, Packet};
pub use transport::Endpoint;
