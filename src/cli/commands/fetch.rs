//! Fetch command - route one request through the controller

use super::load_controller;
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::controller::{Routed, Source};
use crate::error::{PrecacheError, PrecacheResult};
use crate::manifest::ResourceId;
use crate::network::Request;
use console::style;
use std::io::{self, Write};
use tokio::fs;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> PrecacheResult<()> {
    let id = ResourceId::resolve(&args.target, Some(&config.controller.origin))?;
    let request = args
        .headers
        .into_iter()
        .fold(Request::new(&args.method, id), |req, (name, value)| {
            req.with_header(name, value)
        });

    let controller = load_controller(config).await?;
    debug!("Routing {} {}", request.method, request.id);

    let routed = controller.route(&request).await?;
    report_source(&routed);

    if let Some(path) = &args.output {
        fs::write(path, &routed.response.body)
            .await
            .map_err(|e| PrecacheError::io(format!("writing {}", path.display()), e))?;
    }

    let mut stdout = io::stdout().lock();
    if args.include {
        write_head(&mut stdout, &routed)
            .map_err(|e| PrecacheError::io("writing response headers", e))?;
    }
    if args.output.is_none() {
        stdout
            .write_all(&routed.response.body)
            .map_err(|e| PrecacheError::io("writing response body", e))?;
    }
    stdout
        .flush()
        .map_err(|e| PrecacheError::io("flushing stdout", e))
}

fn report_source(routed: &Routed) {
    let source = match routed.source {
        Source::Cache => style("cache").green(),
        Source::Network => style("network").yellow(),
    };
    let content_type = routed.response.header("content-type").unwrap_or("-");
    eprintln!(
        "{} {} {} from {}",
        style("→").dim(),
        routed.response.status,
        content_type,
        source
    );
}

fn write_head(out: &mut impl Write, routed: &Routed) -> io::Result<()> {
    writeln!(out, "HTTP {}", routed.response.status)?;
    for (name, value) in &routed.response.headers {
        writeln!(out, "{}: {}", name, value)?;
    }
    writeln!(out)
}
