pub mod capability;
pub mod content;
pub mod crawler;
pub mod describe;
pub mod error;
pub mod extract;
pub mod transport;

pub use capability::{
    HttpCaptioner, HttpSimplifier, MediaCaptioner, NoCaptioner, NoSimplifier, TextSimplifier,
};
pub use content::{HtmlPage, MediaAsset, MediaType, SiteContent, TextPage};
pub use crawler::{CrawlEngine, EngineState, Frontier, ProgressCallback};
pub use describe::MediaDescriber;
pub use error::{CapabilityError, ScanError, TransportError};
pub use transport::{AnonymizingTransport, TorTransport, TransportConfig};
