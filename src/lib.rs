pub mod api;
pub mod assembler;
pub mod cancel;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod job;
pub mod manager;
pub mod pipeline;
pub mod script;
pub mod server;

pub(crate) fn logv(tag: &str, message: &str) {
    if tag == "WARN" {
        tracing::warn!(tag = tag, "{}", message);
    } else {
        tracing::info!(tag = tag, "{}", message);
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
