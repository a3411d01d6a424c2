//! CLI entry point: parse arguments, load configuration, wire a demo
//! router, and run the connection engine. Continues the role
//! `selenia_server::main` plays in the teacher, minus the process-level
//! master/worker hot-reload machinery — that's a process-supervision
//! concern the spec never names, and this crate is the wiring layer
//! spec.md describes, not a process supervisor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use ignis_core::config::{RuntimeConfig, ServerConfig};
use ignis_http::method::Method;
use ignis_http::request::Request;
use ignis_http::response::Response;
use ignis_http::router::{Binding, Router};
use ignis_http::server::{Handler, Server};

#[derive(Debug, ClapParser)]
#[command(name = "ignis_server", about = "HTTP/1.1 and HTTP/2 serving engine")]
struct Cli {
    /// Path to a TOML configuration file (spec.md §6 "Configuration").
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address; overrides the config file's ip/port when given.
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Worker pool thread count; overrides the config file's value.
    #[arg(short, long)]
    workers: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load_from_file(path)?,
        None => ServerConfig {
            ip: [0, 0, 0, 0].into(),
            port: 8080,
            max_connections: 1024,
            keep_alive_secs: 5,
            tls_cert: None,
            tls_key: None,
            runtime: RuntimeConfig::default(),
        },
    };
    if let Some(listen) = cli.listen {
        config.ip = listen.ip();
        config.port = listen.port();
    }
    if let Some(workers) = cli.workers {
        config.runtime.worker_threads = workers;
    }
    config.validate()?;

    let router = build_demo_router();
    let server = Server::new(config, router)?;
    tracing::info!("ignis_server starting");
    server.run()?;
    Ok(())
}

/// A couple of routes exercising the router's literal and named-parameter
/// matching; real deployments register their own endpoints the same way.
fn build_demo_router() -> Router<Handler> {
    let mut router: Router<Handler> = Router::new();
    router
        .route(
            &[Method::Get],
            "/",
            Arc::new(|_req: &mut Request| {
                Response::once(200, vec![("Content-Length".to_string(), "2".to_string())], b"hi".to_vec())
            }),
        )
        .expect("literal pattern always compiles");
    router
        .route(
            &[Method::Get],
            "/echo/{text}",
            Arc::new(|req: &mut Request| {
                let text = req.context.get::<Binding>().ok().and_then(|b| b.get("text").cloned()).unwrap_or_default();
                let body = text.into_bytes();
                Response::once(200, vec![("Content-Length".to_string(), body.len().to_string())], body)
            }),
        )
        .expect("named-parameter pattern always compiles");
    router
}
