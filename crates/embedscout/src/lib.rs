// ABOUTME: Main library entry point for the embedscout stream scraper.
// ABOUTME: Re-exports the public API: Resolver, ResolverBuilder, providers, Stream types.

//! embedscout - Resolves streaming-site embed pages to direct video URLs.
//!
//! The core is a generic embed resolver: fetch a page with browser-like
//! headers, scan it with an ordered regex pattern table for .m3u8/.mp4
//! URLs, and recurse into nested iframes when nothing matches. On top of
//! it sit per-site providers that search a site for a title, pick the
//! watch page, and resolve every listed server.
//!
//! # Example
//!
//! ```no_run
//! use embedscout::Resolver;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Resolver::builder().build();
//!     if let Some(stream) = resolver.resolve("https://embed.example/e/abc", None).await {
//!         println!("{} ({})", stream.url, stream.stream_type);
//!     }
//! }
//! ```

pub mod cache;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod options;
pub mod providers;
pub mod resolver;
pub mod resource;
pub mod stream;

pub use crate::error::{ErrorCode, ScrapeError};
pub use crate::extract::patterns::{ExtractPattern, PatternSet};
pub use crate::extract::variants::{EmbedTarget, HostFamily};
pub use crate::metadata::{MetadataClient, TitleInfo};
pub use crate::options::{Options, ResolverBuilder};
pub use crate::providers::{
    Coflix, DaySoap, Details, EpisodeEntry, MovieRulz, Provider, SearchHit, ServerEntry,
    StreamRequest, YesMovies,
};
pub use crate::resolver::{Resolver, StreamSource};
pub use crate::stream::{MediaType, ResolvedStream, Stream, StreamType};
