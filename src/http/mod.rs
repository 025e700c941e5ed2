pub mod points;
pub mod request;
pub mod substitute;
pub mod transport;

pub use points::{discover, DiscoveredPoints, InjectionPoint, Location};
pub use request::{BodyKind, RequestModel};
pub use substitute::{baseline, substitute, PreparedRequest};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
