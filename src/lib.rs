//! Client engine for the Serverville multiplexed socket RPC protocol.
//!
//! OVERVIEW
//! ========
//! Many request/reply calls share one connection. Each call carries a
//! per-connection sequence id; replies come back in any order and are matched
//! to their caller by that id. The server may also push unsolicited messages,
//! which are routed to handlers by message type.
//!
//! Socket events never run user code directly. They are buffered in an
//! inbound queue and applied by [`Client::tick`], either from the host's own
//! loop or from a [`Driver`] task.
//!
//! ```no_run
//! # async fn demo() -> Result<(), serverville_client::ClientError> {
//! use serverville_client::{Client, Driver};
//!
//! let client = Client::new("wss://play.example.com");
//! let driver = Driver::spawn(client.clone());
//! if client.init().await?.is_none() {
//!     client.create_anonymous_account(&Default::default()).await?;
//! }
//! let time = client.get_time().await?;
//! println!("server time {}", time.time);
//! driver.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
mod clock;
mod config;
mod correlation;
mod dispatch;
mod driver;
mod error;
mod key_data;
mod messages;
mod pending;
mod queue;
mod router;
mod session;
mod store;
pub mod transport;
mod value;

pub use client::{Client, ClientBuilder, ErrorHandler, InitResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use driver::{Driver, DriverConfig};
pub use error::{CONNECTION_CLOSED, ClientError, ErrorReply, NETWORK_ERROR, SESSION_EXPIRED};
pub use key_data::{KeyData, KeyDataError};
pub use messages::*;
pub use pending::Pending;
pub use queue::{Inbound, InboundSink};
pub use router::{PushHandler, PushMessage};
pub use session::SessionPhase;
pub use store::{FileStore, MemoryStore, SessionStore, session_key};
pub use transport::{ConnectionState, Transport, TransportFactory};
pub use value::{DataType, DataValue, ValueError};
