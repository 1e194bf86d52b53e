// vigil-api: Transport clients for the sources vigil aggregates

pub mod error;
pub mod feed;
pub mod media;
pub mod push;
pub mod transport;
pub mod workspace;

pub use error::Error;
pub use feed::FeedClient;
pub use media::InferenceClient;
pub use push::{PushMessage, PushSession, PushTransport, WsTransport};
pub use transport::{TlsMode, TransportConfig};
pub use workspace::{CalendarEvent, MailMessage, NewEvent, WorkspaceClient};
