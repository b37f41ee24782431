use anyhow::Result;
use msgloop::prelude::*;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// The relay stops once a value at or past this one reaches the worker.
const FINAL_VALUE: i32 = 11;
const SEED_DELAY: Duration = Duration::from_millis(1000);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Create both loops. Handles exist before any handler is registered so
    //    each side can post to the other.
    let mut main_loop = MessageLoop::new(LoopConfig::load(None)?.renamed("main"));
    let mut worker_loop = MessageLoop::new(LoopConfig::load(None)?.renamed("worker"));
    let main_handle = main_loop.handle();
    let worker_handle = worker_loop.handle();

    // 3. Watch both lifecycle streams.
    spawn_event_listener(&main_handle);
    spawn_event_listener(&worker_handle);

    // 4. Wire the relay: each side bumps the value and hands it to the other.
    {
        let main_handle = main_handle.clone();
        worker_loop.set_on_stop(move || main_handle.stop());
    }
    {
        let main_handle = main_handle.clone();
        let worker_handle = worker_handle.clone();
        worker_loop.set_on_handle(move |mut msg| match msg.take::<i32>() {
            Ok(value) => {
                println!("worker got data: {value}");
                if value >= FINAL_VALUE {
                    worker_handle.stop();
                } else {
                    main_handle.post_message(Message::new(msg.what).with_payload(value + 1), 0);
                }
            }
            Err(err) => warn!(%err, "worker received an unusable message"),
        });
    }
    {
        let worker_handle = worker_handle.clone();
        main_loop.set_on_handle(move |mut msg| match msg.take::<i32>() {
            Ok(value) => {
                println!("main got data: {value}");
                worker_handle.post_message(Message::new(msg.what).with_payload(value + 1), 0);
            }
            Err(err) => warn!(%err, "main received an unusable message"),
        });
    }

    // 5. Seed the main loop, then run both loops on blocking threads.
    main_handle.post_message_after(Message::new(0).with_payload(0_i32), SEED_DELAY);

    let worker = tokio::task::spawn_blocking(move || worker_loop.run());
    let main = tokio::task::spawn_blocking(move || main_loop.run());
    worker.await?;
    main.await?;

    info!("both loops have stopped");
    Ok(())
}

/// Spawns a task that logs every lifecycle event of one loop.
fn spawn_event_listener(handle: &LoopHandle) {
    let mut events = handle.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("[EVENT] => {:?}", event);
        }
    });
}
