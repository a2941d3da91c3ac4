//! Asynchronous log sink.
//!
//! Implements the `log` facade: callers format through the usual macros, the
//! sink enqueues finished lines over a channel, and a worker thread does the
//! actual writing so render threads never block on IO. `shutdown` drains the
//! queue, joins the worker, and leaves the facade pointing at a disconnected
//! sender (harmless; late messages are dropped).

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;

enum Message {
    Line(Level, String),
    Quit,
}

struct AsyncLogger {
    sender: Mutex<Sender<Message>>,
}

impl Log for AsyncLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let line = format!("[{}] {}", record.target(), record.args());
        // A disconnected receiver means we are past shutdown; drop the line.
        let _ = self
            .sender
            .lock()
            .unwrap()
            .send(Message::Line(record.level(), line));
    }

    fn flush(&self) {}
}

static WORKER: Mutex<Option<(Sender<Message>, JoinHandle<()>)>> = Mutex::new(None);

/// Starts the writer thread and installs the facade. Safe to call more than
/// once; only the first call wins.
pub fn init() {
    let mut worker = WORKER.lock().unwrap();
    if worker.is_some() {
        return;
    }

    let (sender, receiver) = channel::<Message>();
    let handle = std::thread::Builder::new()
        .name(String::from("log"))
        .spawn(move || {
            let stderr = std::io::stderr();
            while let Ok(message) = receiver.recv() {
                match message {
                    Message::Line(level, line) => {
                        let mut out = stderr.lock();
                        let _ = writeln!(out, "{:<5} {}", level, line);
                    }
                    Message::Quit => break,
                }
            }
        })
        .expect("failed to spawn log thread");

    // set_boxed_logger fails if a logger is already installed; keep the
    // worker around regardless so shutdown stays well-defined.
    let _ = log::set_boxed_logger(Box::new(AsyncLogger {
        sender: Mutex::new(sender.clone()),
    }));
    log::set_max_level(LevelFilter::Trace);

    *worker = Some((sender, handle));
}

/// Signals the writer, waits for it to drain, and joins it.
pub fn shutdown() {
    let taken = WORKER.lock().unwrap().take();
    if let Some((sender, handle)) = taken {
        let _ = sender.send(Message::Quit);
        let _ = handle.join();
    }
}

/// Registers init/shutdown with the globals registry.
pub fn register() {
    crate::globals::register("log", init, shutdown);
}
