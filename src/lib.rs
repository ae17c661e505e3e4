// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RPKI-to-Router (RTR) origin authentication core.
//!
//! Decodes validated ROAs into a canonical prefix-origin RIB, journals it as
//! AXFR (full snapshot) / IXFR (incremental delta) files, and serves both
//! over the RTR wire protocol to routers.
//!
//! # Quick start
//!
//! ```bash
//! # Build a new RIB snapshot from ROAs found under /var/rpki/roas
//! rtr-rib builder --roa-dir /var/rpki/roas --data-dir /var/rtr-rib/data
//!
//! # Serve the current snapshot over stdio (one process per connection)
//! rtr-rib server --data-dir /var/rtr-rib/data --wakeup-dir /var/rtr-rib/wakeup
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod pdu;
pub mod prefix;
pub mod prefix_set;
pub mod roa;
pub mod server;
pub mod wakeup;

pub use builder::Builder;
pub use config::{BuilderConfig, ConfigError, ServerConfig};
pub use error::{BuilderError, ClientError, PduError, PrefixError, RoaError, ServerError};
pub use pdu::Pdu;
pub use prefix::{Afi, PrefixAssertion};
pub use prefix_set::PrefixSet;
