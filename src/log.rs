static INIT: std::sync::Once = std::sync::Once::new();

#[cfg(not(target_arch = "wasm32"))]
fn init_tracing_subscriber() {
    use std::io;
    use std::{env, fs};
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env("SOCIAL_LOGIN_LOG").unwrap_or_else(|_| EnvFilter::from("off"));
    let b = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);

    let file = env::var("SOCIAL_LOGIN_LOG_PATH").ok().and_then(|p| {
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&p)
            .inspect_err(|e| eprintln!("cannot open log file {p}: {e}; logging to stderr"))
            .ok()
    });
    match file {
        Some(f) => b.with_writer(f).init(),
        None => b.with_writer(io::stderr).init(),
    }
}

#[cfg(target_arch = "wasm32")]
fn init_tracing_subscriber() {
    use tracing_subscriber::prelude::*;
    use tracing_web::MakeWebConsoleWriter;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_writer(MakeWebConsoleWriter::new());

    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn set_global_logger() {
    INIT.call_once(|| {
        init_tracing_subscriber();
        tracing::debug!("Logger initialized");
    });
}
