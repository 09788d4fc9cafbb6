//! Logging backend which writes to a file in the plugin directory.

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::mpsc,
    thread::JoinHandle,
};

struct Message {
    module: String,
    level: Level,
    string: String,
    time: String,
}

impl Message {
    fn format(&self) -> String {
        let level_name = match self.level {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug | Level::Trace => "debug",
        };

        //      [date time] [module] [level] Text
        format!(
            "[{}] [{}] [{}] {}\n",
            self.time, self.module, level_name, self.string
        )
    }

    fn write_to_file(&self, file: &mut File) {
        let _ = file.write_all(self.format().as_bytes());
    }
}

/// The sending end of the log channel and the thread draining it.
struct Writer {
    sender: mpsc::Sender<Message>,
    thread: JoinHandle<()>,
}

static WRITER: Mutex<Option<Writer>> = parking_lot::const_mutex(None);

pub struct Logger;

impl Logger {
    pub fn commit(&self, record: &log::Record) {
        let module_path = match record.module_path() {
            Some(path) => path,
            None => return,
        };

        let message = Message {
            module: module_path
                .split("::")
                .last()
                .unwrap_or("unknown")
                .to_string(),
            level: record.level(),
            string: format!("{}", record.args()),
            time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        };

        if let Some(writer) = WRITER.lock().as_ref() {
            // The only failure is a writer thread that has already stopped.
            let _ = writer.sender.send(message);
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.commit(record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

fn install_panic_hook() {
    // Unwinding into the server isn't possible, so dump what we can and abort.
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "no message".to_string());

        let location = info
            .location()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string());

        let info_dump = format!(
            "FixedMatingTimer panicked.

Message: {message}
Location: {location}
Time: {}
Backtrace:

{:?}",
            Local::now(),
            backtrace::Backtrace::new()
        );

        log::error!("{info_dump}");

        let _ = std::fs::write(crate::resources::get_plugin_path("PANIC.txt"), info_dump);

        std::process::abort();
    }));
}

/// Starts a thread that appends formatted messages to the file at `path`.
fn start_writer(path: &Path) -> std::io::Result<Writer> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let (sender, receiver) = mpsc::channel::<Message>();

    // Writing on a background thread keeps file I/O off the game thread.
    let thread = std::thread::spawn(move || {
        for msg in receiver {
            msg.write_to_file(&mut file);
        }
    });

    Ok(Writer { sender, thread })
}

pub fn init() {
    install_panic_hook();

    let level = if cfg!(feature = "debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // This fails if a logger is already set, which is fine.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    let mut writer = WRITER.lock();

    if writer.is_some() {
        return;
    }

    // If the file can't be opened there's nowhere to report it. Messages are dropped.
    if let Ok(started) = start_writer(&crate::resources::get_log_path()) {
        *writer = Some(started);
    }
}

/// Stops the writer thread once everything already logged has been written. The plugin's code
/// must not be running on another thread when the server unloads it.
pub fn shutdown() {
    let writer = WRITER.lock().take();

    if let Some(Writer { sender, thread }) = writer {
        drop(sender);
        let _ = thread.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_bracketed_format() {
        let message = Message {
            module: "command".to_string(),
            level: Level::Warn,
            string: "something odd".to_string(),
            time: "2024-01-01 00:00:00.000".to_string(),
        };

        assert_eq!(
            message.format(),
            "[2024-01-01 00:00:00.000] [command] [warning] something odd\n"
        );
    }

    #[test]
    fn writer_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let writer = start_writer(&path).unwrap();

        writer
            .sender
            .send(Message {
                module: "settings".to_string(),
                level: Level::Info,
                string: "hello".to_string(),
                time: "now".to_string(),
            })
            .unwrap();

        drop(writer.sender);
        writer.thread.join().unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[now] [settings] [info] hello\n"
        );
    }
}
