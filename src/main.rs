mod cli;
mod clock;
mod logging;
mod outside;
mod page;
mod recorder;
mod result;
mod task;
#[cfg(test)]
mod testing;
mod watcher;
mod windows;
mod worker;

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use clap::Parser;
use clock::{Clock, SystemClock};
use miette::{miette, Context, IntoDiagnostic};
use outside::{Airtable, Browser, Drive, WebDriver};
use page::FavoritesPage;
use recorder::Recorder;
use tracing::{debug, info, Level};
use watcher::NotifyWatcher;
use windows::Windows;
use worker::Worker;

use crate::cli::Args;

fn main() -> miette::Result<()> {
    // Initialize the environment & CLI
    dotenv::dotenv().ok();
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    logging::init_logging(level)?;

    std::fs::create_dir_all(&args.download_dir)
        .into_diagnostic()
        .wrap_err("Could not create download directory")?;

    info!("Connecting to chromedriver and the record store");
    let (browser, store) = connect_collaborators(&args)?;
    let host = Drive::new(&args.drive_token);
    let clock = SystemClock;

    // Bring up the favorites listing; this window is home for the whole run
    let page = FavoritesPage::new(&browser, &clock);
    page.open(&args.username).map_err(miette::Report::from)?;
    let windows = Windows::new(&browser).map_err(miette::Report::from)?;

    let recorder = Recorder::new(&store, &host);
    let notify_watcher = NotifyWatcher;
    let shutdown = AtomicBool::new(false);

    std::thread::scope(|scope| -> miette::Result<()> {
        let worker = Worker::new(
            page,
            &browser,
            windows,
            recorder,
            &notify_watcher,
            &clock,
            &args.download_dir,
            &shutdown,
        );
        let worker_thread = std::thread::Builder::new()
            .name("worker".to_owned())
            .spawn_scoped(scope, move || worker.run())
            .into_diagnostic()
            .wrap_err("Could not spawn the worker thread")?;

        keepalive(&browser, &clock, &shutdown);

        match worker_thread.join() {
            Ok(res) => res.map_err(miette::Report::from),
            Err(_) => Err(miette!("Worker thread panicked")),
        }
    })?;

    info!("Session over, goodbye");
    Ok(())
}

/// Touch the browser once per second until it stops answering, then wind
/// the pipeline down. This is the only unbounded wait in the program; it
/// ends when the browser session itself ends.
fn keepalive(browser: &dyn Browser, clock: &dyn Clock, shutdown: &AtomicBool) {
    const KEEPALIVE_POLL: Duration = Duration::from_secs(1);

    while !shutdown.load(Ordering::Relaxed) {
        if !session_alive(browser) {
            info!("Browser closed, shutting down");
            shutdown.store(true, Ordering::Relaxed);
            break;
        }
        clock.sleep(KEEPALIVE_POLL);
    }
    debug!("Keepalive loop ended");
}

/// Liveness probe for the keepalive loop. Listing window handles needs no
/// current browsing context, so a tick landing in the instant between the
/// worker closing a tab and refocusing home still sees a live session.
fn session_alive(browser: &dyn Browser) -> bool {
    browser.windows().is_ok()
}

/// Bring up the two sessionful collaborators concurrently; both probe their
/// service on construction and neither is instantaneous.
fn connect_collaborators(args: &Args) -> miette::Result<(WebDriver, Airtable)> {
    std::thread::scope(|scope| {
        let browser_thread =
            scope.spawn(|| WebDriver::connect(&args.webdriver_url, &args.download_dir));
        let store_thread = scope.spawn(|| {
            Airtable::connect(&args.airtable_token, &args.airtable_base, &args.airtable_table)
        });

        let browser = browser_thread
            .join()
            .expect("Could not join thread")
            .map_err(miette::Report::from)
            .wrap_err("Could not connect to chromedriver")?;
        let store = store_thread
            .join()
            .expect("Could not join thread")
            .map_err(miette::Report::from)
            .wrap_err("Could not connect to Airtable")?;

        Ok((browser, store))
    })
}
