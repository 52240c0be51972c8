//! Process-wide log routing.
//!
//! Records logged through the `log` facade are routed by level: errors and
//! warnings to the error target, info and below to the info target. Each
//! target is silent, a standard stream, or a channel another thread drains.

use crossbeam_channel::Sender;
use lazy_static::lazy_static;
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::RwLock;
use std::io::Write;

/// Messages longer than this are cut and suffixed with `...`.
pub const MAX_MESSAGE_LEN: usize = 2048;

/// Where one class of log records goes.
#[derive(Debug, Clone)]
pub enum LogTarget {
    Silent,
    Stdout,
    Stderr,
    Channel(Sender<String>),
}

#[derive(Debug)]
struct Routes {
    error: LogTarget,
    info: LogTarget,
}

lazy_static! {
    static ref ROUTES: RwLock<Routes> = RwLock::new(Routes {
        error: LogTarget::Stderr,
        info: LogTarget::Silent,
    });
}

static LOGGER: RoutingLogger = RoutingLogger;

/// Route error and warning records.
pub fn set_error_target(target: LogTarget) {
    ROUTES.write().error = target;
}

/// Route info, debug and trace records.
pub fn set_info_target(target: LogTarget) {
    ROUTES.write().info = target;
}

/// Install the routing logger as the global `log` backend.
///
/// Calling this again after a successful install is a no-op.
pub fn install() -> Result<(), log::SetLoggerError> {
    static INSTALLED: std::sync::Once = std::sync::Once::new();
    let mut result = Ok(());
    INSTALLED.call_once(|| {
        result = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Trace));
    });
    result
}

/// Shorten `msg` to [`MAX_MESSAGE_LEN`] bytes on a char boundary.
pub fn truncate_message(msg: &str) -> std::borrow::Cow<'_, str> {
    if msg.len() <= MAX_MESSAGE_LEN {
        return msg.into();
    }
    let mut end = MAX_MESSAGE_LEN - 3;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end]).into()
}

struct RoutingLogger;

impl RoutingLogger {
    fn emit(is_error: bool, line: &str) {
        let target = {
            let routes = ROUTES.read();
            if is_error {
                routes.error.clone()
            } else {
                routes.info.clone()
            }
        };
        match target {
            LogTarget::Silent => {}
            LogTarget::Stdout => {
                let _ = writeln!(std::io::stdout(), "{line}");
            }
            LogTarget::Stderr => {
                let _ = writeln!(std::io::stderr(), "{line}");
            }
            LogTarget::Channel(tx) => {
                if tx.send(line.to_owned()).is_err() {
                    let mut routes = ROUTES.write();
                    let slot = if is_error { &mut routes.error } else { &mut routes.info };
                    if matches!(slot, LogTarget::Channel(cur) if cur.same_channel(&tx)) {
                        *slot = LogTarget::Silent;
                    }
                    drop(routes);
                    let _ = writeln!(
                        std::io::stderr(),
                        "rtstream: log receiver closed, {} output silenced",
                        if is_error { "error" } else { "info" }
                    );
                }
            }
        }
    }
}

impl Log for RoutingLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        let is_error = record.level() <= Level::Warn;
        let text = record.args().to_string();
        Self::emit(is_error, &truncate_message(&text));
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}
