//! Logger bring-up helpers
//!
//! Thin wrappers over `env_logger` so applications get consistent output
//! without configuring a logger themselves. `RUST_LOG` still overrides the
//! defaults chosen here.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Initialize console logging at `info` level by default.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Initialize logging that appends to the file at `path` instead of stderr.
pub fn init_with_file<P: AsRef<Path>>(path: P) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init();
        init();
        log::info!("logger ready");
    }
}
