//! Binary entrypoint for cloudframe.
//!
//! Startup is strictly sequential: flags, logging, framebuffer, credentials,
//! authorization (possibly interactive), then the background lister and the
//! rotation loop. Any startup failure exits non-zero with context;
//! steady-state fetch/render errors only log.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cloudframe::events::PhotoUrl;
use cloudframe::tasks::rotation::FrameScreen;
use cloudframe::{auth, config, fb, fetch, photos, tasks};

#[tokio::main]
async fn main() -> Result<()> {
    let args = config::Args::parse().validated()?;
    config::init_tracing(args.verbose);

    let fb = fb::Framebuffer::open(&args.device)
        .with_context(|| format!("initializing framebuffer at {}", args.device.display()))?;
    info!(
        width = fb.width(),
        height = fb.height(),
        "framebuffer ready"
    );

    let secrets = auth::ClientSecrets::from_file(&args.credentials).with_context(|| {
        format!(
            "reading client credentials from {}",
            args.credentials.display()
        )
    })?;
    let cache_path = auth::default_cache_path()?;
    let http = photos::http_client().context("building HTTP client")?;
    let client = auth::obtain_client(http, secrets, cache_path)
        .await
        .context("initializing authorized client")?;

    let (url_tx, url_rx) = mpsc::unbounded_channel::<PhotoUrl>();
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cancel = cancel.clone();
        let page_size = args.page_size;
        async move {
            tasks::lister::run(client, page_size, url_tx, cancel)
                .await
                .context("lister task failed")
        }
    });

    let fetcher = fetch::Fetcher::new().context("building image fetch client")?;
    let mut screen = FrameScreen::new(fetcher, fb);

    // The rotation loop runs on the main task until cancellation; the
    // framebuffer handle is dropped when it returns.
    if let Err(err) = tasks::rotation::run(&mut screen, url_rx, args.interval, cancel.clone()).await
    {
        tracing::error!("{err:?}");
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("task error: {err:?}"),
            Err(err) => tracing::error!("join error: {err}"),
        }
    }

    Ok(())
}
