//! The coordination core. Merges two event sources, "a new URL became
//! known" and "time to show a photo", over an append-only set of known
//! URLs. One event is processed at a time; a slow fetch+render delays the
//! next event but never corrupts state.

use anyhow::{Context, Result};
use rand::Rng;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::PhotoUrl;
use crate::fb::Framebuffer;
use crate::fetch::Fetcher;
use crate::render;

/// Seam between the loop and the fetch+render pipeline, so the loop's event
/// handling can be exercised without a device or network.
#[allow(async_fn_in_trait)]
pub trait Screen {
    async fn show(&mut self, url: &PhotoUrl) -> Result<()>;
}

/// The real pipeline: fetch a pre-scaled variant, decode, cover-fit onto
/// the framebuffer.
pub struct FrameScreen {
    fetcher: Fetcher,
    fb: Framebuffer,
}

impl FrameScreen {
    pub fn new(fetcher: Fetcher, fb: Framebuffer) -> Self {
        Self { fetcher, fb }
    }
}

impl Screen for FrameScreen {
    async fn show(&mut self, url: &PhotoUrl) -> Result<()> {
        let image = self
            .fetcher
            .fetch(url)
            .await
            .with_context(|| format!("fetching photo at {url}"))?;
        render::show(&mut self.fb, &image).with_context(|| format!("rendering photo at {url}"))
    }
}

/// Append-only set of discovered photo URLs. Single writer (the lister's
/// channel), single reader (the rotation loop at tick time). Duplicates are
/// kept; selection is uniform with replacement.
#[derive(Debug, Default)]
pub struct KnownPhotos {
    urls: Vec<PhotoUrl>,
}

impl KnownPhotos {
    pub fn push(&mut self, url: PhotoUrl) {
        self.urls.push(url);
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<&PhotoUrl> {
        if self.urls.is_empty() {
            return None;
        }
        Some(&self.urls[rng.random_range(0..self.urls.len())])
    }

    pub fn urls(&self) -> &[PhotoUrl] {
        &self.urls
    }
}

/// Runs until cancelled. The first tick fires one interval after start; a
/// tick before any URL has arrived is a logged no-op. Show failures are
/// logged with the offending URL and never remove it from the set.
pub async fn run<S: Screen>(
    screen: &mut S,
    mut urls: UnboundedReceiver<PhotoUrl>,
    period: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut known = KnownPhotos::default();
    let mut rng = rand::rng();
    let mut listing_open = true;

    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        select! {
            _ = cancel.cancelled() => break,

            arrived = urls.recv(), if listing_open => match arrived {
                Some(url) => known.push(url),
                None => {
                    listing_open = false;
                    info!(known = known.len(), "photo listing finished");
                }
            },

            _ = ticks.tick() => {
                let Some(url) = known.pick(&mut rng) else {
                    info!("empty collection, skipping");
                    continue;
                };
                let url = url.clone();
                info!(total = known.len(), url = %url, "displaying random photo");
                if let Err(err) = screen.show(&url).await {
                    warn!(url = %url, "failed to display photo: {err:#}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    fn url(s: &str) -> PhotoUrl {
        PhotoUrl(s.to_string())
    }

    #[derive(Default)]
    struct RecordingScreen {
        shown: Vec<PhotoUrl>,
        fail: bool,
    }

    impl Screen for RecordingScreen {
        async fn show(&mut self, url: &PhotoUrl) -> Result<()> {
            self.shown.push(url.clone());
            if self.fail {
                bail!("synthetic display failure");
            }
            Ok(())
        }
    }

    #[test]
    fn arrivals_are_kept_in_order() {
        let mut known = KnownPhotos::default();
        for name in ["a", "b", "c"] {
            known.push(url(name));
        }
        assert_eq!(known.len(), 3);
        assert_eq!(known.urls(), &[url("a"), url("b"), url("c")]);
    }

    #[test]
    fn duplicates_are_not_deduplicated() {
        let mut known = KnownPhotos::default();
        known.push(url("a"));
        known.push(url("a"));
        assert_eq!(known.len(), 2);
    }

    #[test]
    fn pick_on_empty_is_none() {
        let known = KnownPhotos::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(known.pick(&mut rng).is_none());
    }

    #[test]
    fn pick_always_selects_a_member() {
        let mut known = KnownPhotos::default();
        for name in ["a", "b", "c", "d"] {
            known.push(url(name));
        }
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let picked = known.pick(&mut rng).unwrap();
            assert!(known.urls().contains(picked));
        }
    }

    #[test]
    fn pick_repeats_across_calls() {
        // With replacement: a single entry is selected every time.
        let mut known = KnownPhotos::default();
        known.push(url("only"));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(known.pick(&mut rng), Some(&url("only")));
        }
    }

    async fn drive<S: Screen>(
        screen: &mut S,
        rx: mpsc::UnboundedReceiver<PhotoUrl>,
        run_for: Duration,
    ) {
        let cancel = CancellationToken::new();
        let loop_fut = run(screen, rx, Duration::from_secs(10), cancel.clone());
        tokio::pin!(loop_fut);
        select! {
            _ = &mut loop_fut => panic!("rotation loop ended before cancellation"),
            _ = sleep(run_for) => {}
        }
        cancel.cancel();
        loop_fut.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_with_empty_set_never_shows() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut screen = RecordingScreen::default();
        // three ticks pass without any known URL
        drive(&mut screen, rx, Duration::from_secs(35)).await;
        assert!(screen.shown.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_show_only_known_urls() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(url("a")).unwrap();
        tx.send(url("b")).unwrap();
        tx.send(url("c")).unwrap();

        let mut screen = RecordingScreen::default();
        drive(&mut screen, rx, Duration::from_secs(25)).await;

        assert_eq!(screen.shown.len(), 2);
        for shown in &screen.shown {
            assert!([url("a"), url("b"), url("c")].contains(shown));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_url_is_retried_on_later_ticks() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(url("broken")).unwrap();
        drop(tx);

        let mut screen = RecordingScreen {
            fail: true,
            ..Default::default()
        };
        drive(&mut screen, rx, Duration::from_secs(25)).await;

        // Both ticks attempted the same permanently-broken URL.
        assert_eq!(screen.shown, vec![url("broken"), url("broken")]);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_keeps_loop_running() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(url("a")).unwrap();
        drop(tx);

        let mut screen = RecordingScreen::default();
        drive(&mut screen, rx, Duration::from_secs(15)).await;
        assert_eq!(screen.shown, vec![url("a")]);
    }
}
