// ABOUTME: CLI for resolving embed pages and scraping provider streams.
// ABOUTME: Prints JSON for verification; logs go to stderr via RUST_LOG.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use embedscout::{
    Coflix, DaySoap, MediaType, MetadataClient, MovieRulz, Provider, Resolver, StreamRequest,
    YesMovies,
};
use serde_json::json;

/// Resolve streaming embeds and scrape provider streams.
#[derive(Parser, Debug)]
#[command(name = "embedscout")]
#[command(about = "Resolve embed pages to direct video streams", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output compact JSON instead of pretty.
    #[arg(long, global = true, default_value_t = false)]
    compact: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a single embed page URL to a direct stream URL.
    Resolve {
        embed_url: String,

        /// Prefer the candidate whose URL or source matches this hint.
        #[arg(long)]
        server_hint: Option<String>,

        /// Allow requests to private networks (local testing only).
        #[arg(long, default_value_t = false)]
        allow_private: bool,
    },
    /// Fetch streams for a title from one provider.
    Streams {
        /// Provider id: yesmovies, coflix, movierulz, daysoap.
        provider: String,

        /// "movie" or "tv".
        media_type: String,

        /// TMDB id of the title.
        tmdb_id: String,

        #[arg(long)]
        season: Option<u32>,

        #[arg(long)]
        episode: Option<u32>,
    },
    /// List trending titles from a provider that exposes them.
    Trending {
        /// Provider id: yesmovies or daysoap.
        provider: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let output = match args.command {
        Command::Resolve {
            embed_url,
            server_hint,
            allow_private,
        } => {
            let resolver = Resolver::builder()
                .allow_private_networks(allow_private)
                .build();
            match resolver.resolve(&embed_url, server_hint.as_deref()).await {
                Some(stream) => json!({
                    "ok": true,
                    "embed_url": embed_url,
                    "stream": stream,
                }),
                None => json!({
                    "ok": false,
                    "embed_url": embed_url,
                    "stream": null,
                }),
            }
        }
        Command::Streams {
            provider,
            media_type,
            tmdb_id,
            season,
            episode,
        } => {
            let resolver = Arc::new(Resolver::builder().build());
            let metadata = Arc::new(MetadataClient::new(resolver.http().clone()));
            let provider = make_provider(&provider, resolver, metadata)?;
            let request = StreamRequest {
                media_type: MediaType::from(media_type.as_str()),
                tmdb_id,
                season,
                episode,
            };
            let streams = provider.streams(&request).await;
            json!({
                "provider": provider.id(),
                "count": streams.len(),
                "streams": streams,
            })
        }
        Command::Trending { provider } => {
            let resolver = Arc::new(Resolver::builder().build());
            let metadata = Arc::new(MetadataClient::new(resolver.http().clone()));
            let hits = match provider.as_str() {
                "yesmovies" => YesMovies::new(resolver, metadata).trending().await?,
                "daysoap" => DaySoap::new(resolver, metadata).trending().await?,
                other => bail!("provider {} does not expose trending", other),
            };
            let rows: Vec<_> = hits
                .iter()
                .map(|hit| {
                    json!({
                        "title": hit.title,
                        "url": hit.url,
                        "year": hit.year,
                        "poster": hit.poster,
                        "type": hit.media_type.map(|t| t.to_string()),
                    })
                })
                .collect();
            json!({ "provider": provider, "count": rows.len(), "results": rows })
        }
    };

    if args.compact {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

fn make_provider(
    name: &str,
    resolver: Arc<Resolver>,
    metadata: Arc<MetadataClient>,
) -> Result<Box<dyn Provider>> {
    Ok(match name {
        "yesmovies" => Box::new(YesMovies::new(resolver, metadata)),
        "coflix" => Box::new(Coflix::new(resolver, metadata)),
        "movierulz" => Box::new(MovieRulz::new(resolver, metadata)),
        "daysoap" => Box::new(DaySoap::new(resolver, metadata)),
        other => bail!("unknown provider: {}", other),
    })
}
