use anyhow::Result;
use colored::Colorize;
use msgloop::prelude::*;
use msgloop::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-----------------------------------------------------------------".dimmed());
    println!("{}", version_string);
    println!(
        "{}",
        "    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.".dimmed()
    );
    println!("{}", "-----------------------------------------------------------------".dimmed());
}

/// Spawns a task printing the loop's lifecycle events while `enabled` is set.
fn spawn_event_listener(handle: &LoopHandle, enabled: Arc<AtomicBool>) {
    let mut events = handle.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if enabled.load(Ordering::Relaxed) {
                        println!("\n<-- [LOOP EVENT] {:?}", event);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    println!("\n<-- [LOOP EVENT] {} events missed", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Builds the loop the shell drives. Messages are printed with their payload.
fn build_loop(config: LoopConfig) -> MessageLoop {
    MessageLoop::builder(config)
        .on_start(|| info!("dispatch loop running"))
        .on_stop(|| info!("dispatch loop stopped"))
        .on_handle(|msg| {
            let text = match msg.retrieve::<String>() {
                Ok(text) => text.clone(),
                Err(err) => format!("({})", err),
            };
            println!(
                "\n<-- [MESSAGE] what={} arg1={} arg2={} payload={}",
                msg.what, msg.arg1, msg.arg2, text
            );
        })
        .build()
}

/// Runs the loop on a dedicated thread and hands it back once it stops.
fn spawn_loop(mut event_loop: MessageLoop) -> JoinHandle<MessageLoop> {
    thread::spawn(move || {
        event_loop.run();
        event_loop
    })
}

fn parse<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Option<T> {
    match args.get(index).map(|raw| raw.parse::<T>()) {
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            println!("Error: '{}' is not a valid {}.", args[index], what);
            None
        }
        None => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = LoopConfig::load(config_path.as_deref())?;
    let event_loop = build_loop(config);
    let handle = event_loop.handle();

    let events_enabled = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&handle, events_enabled.clone());

    info!("Spawning {} loop '{}'...", ENGINE_NAME.cyan(), handle.name());
    let mut runner = Some(spawn_loop(event_loop));

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "task" => {
                            let delay = parse::<u64>(&args, 1, "delay in milliseconds");
                            if let Some(delay_ms) = delay {
                                let label = if args.len() > 2 {
                                    args[2..].join(" ")
                                } else {
                                    "task".to_string()
                                };
                                let fired = format!("'{}' fired after {} ms", label, delay_ms);
                                let announce = move || println!("\n<-- [TASK] {}", fired);
                                handle.post_task(announce, delay_ms);
                                println!("--> Posted '{}' with a {} ms delay.", label, delay_ms);
                            } else if args.len() < 2 {
                                println!("Usage: task <DELAY_MS> [LABEL]");
                            }
                        }
                        "msg" => {
                            if args.len() < 5 {
                                println!("Usage: msg <WHAT> <ARG1> <ARG2> <DELAY_MS> [TEXT]");
                            } else if let (Some(what), Some(arg1), Some(arg2), Some(delay_ms)) = (
                                parse::<i32>(&args, 1, "integer"),
                                parse::<i32>(&args, 2, "integer"),
                                parse::<i32>(&args, 3, "integer"),
                                parse::<u64>(&args, 4, "delay in milliseconds"),
                            ) {
                                let mut message = Message::new(what).with_args(arg1, arg2);
                                if args.len() > 5 {
                                    message.attach(args[5..].join(" "));
                                }
                                handle.post_message(message, delay_ms);
                                println!(
                                    "--> Posted message what={} with a {} ms delay.",
                                    what, delay_ms
                                );
                            }
                        }
                        "pending" => {
                            println!("Pending items: {}", handle.pending());
                        }
                        "stop" => {
                            if handle.is_stopping() {
                                println!("--> Loop is already stopped.");
                            } else {
                                handle.stop();
                                println!("--> Stop requested; pending items were discarded.");
                            }
                        }
                        "start" => {
                            match runner.take() {
                                Some(running) if !running.is_finished() => {
                                    println!("--> Loop is already running.");
                                    runner = Some(running);
                                }
                                Some(finished) => match finished.join() {
                                    Ok(event_loop) => {
                                        runner = Some(spawn_loop(event_loop));
                                        println!("--> Loop restarted.");
                                    }
                                    Err(_) => println!("Error: the loop thread panicked."),
                                },
                                None => println!("Error: no loop available to start."),
                            }
                        }
                        "events" => match args.get(1) {
                            Some(&"on") => {
                                events_enabled.store(true, Ordering::Relaxed);
                                println!("--> Started printing loop events.");
                            }
                            Some(&"off") => {
                                events_enabled.store(false, Ordering::Relaxed);
                                println!("--> Stopped printing loop events.");
                            }
                            _ => println!("Usage: events on|off"),
                        },
                        "help" => {
                            println!("Available commands:");
                            println!("  task <MS> [LABEL]             - Posts a task that fires after MS milliseconds.");
                            println!("  msg <W> <A1> <A2> <MS> [TEXT] - Posts a message, optionally with a text payload.");
                            println!("  pending                       - Shows how many items are waiting.");
                            println!("  stop                          - Stops the loop and discards pending items.");
                            println!("  start                         - Restarts a stopped loop.");
                            println!("  events on|off                 - Toggles printing of lifecycle events.");
                            println!("  exit                          - Quits the shell.");
                        }
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting loopshell...");
                break;
            }
        }
    }

    handle.stop();
    if let Some(running) = runner.take() {
        running.join().ok();
    }

    Ok(())
}
