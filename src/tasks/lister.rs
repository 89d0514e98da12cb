//! Background flow that walks the remote library page by page and streams
//! every photo URL into the rotation loop's channel. URLs already sent stay
//! valid if a later page fails; the task error is surfaced by the JoinSet
//! drain in `main` and the rest of the process keeps running.

use anyhow::{Context, Result};
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::PhotoUrl;
use crate::photos::ApiClient;

pub async fn run(
    mut client: ApiClient,
    page_size: i32,
    to_rotation: UnboundedSender<PhotoUrl>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut page_token: Option<String> = None;
    let mut total = 0usize;

    loop {
        let page = select! {
            _ = cancel.cancelled() => {
                info!("cancel received; stopping library listing");
                return Ok(());
            }
            page = client.search_photos(page_size, page_token.as_deref()) => {
                page.context("listing photo library page")?
            }
        };

        for item in page.media_items {
            total += 1;
            if to_rotation.send(PhotoUrl(item.base_url)).is_err() {
                debug!("rotation loop gone; stopping library listing");
                return Ok(());
            }
        }
        debug!(total, "library page processed");

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    // Dropping the sender on return closes the channel, which is the
    // consumer's "listing finished" signal.
    info!(total, "library listing complete");
    Ok(())
}
