// Licensed under the MIT License.

//! Wire protocol, data model, id mapping and request/response correlation shared by
//! the manager-side connector and the gateway-side client.

pub mod codec;
pub mod correlator;
pub mod error;
pub mod id_map;
pub mod model;
pub mod transport;

pub use error::{GatewaySyncError, Result};
