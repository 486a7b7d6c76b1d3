//! Fallback for platforms without a listener scanner.

use crate::error::{Error, Result};

use super::{ListenerMap, Scanner};

pub struct UnsupportedScanner;

impl Scanner for UnsupportedScanner {
    async fn scan(&self) -> Result<ListenerMap> {
        Err(Error::UnsupportedPlatform(format!(
            "listening port discovery is not available on {}",
            std::env::consts::OS
        )))
    }
}
