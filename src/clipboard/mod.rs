use thiserror::Error;
use tracing::{debug, warn};

/// Clipboard access failed. Never fatal: the code on screen is still right.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Access(#[from] arboard::Error),
}

/// Text access to a clipboard.
pub trait Clipboard {
    fn read(&mut self) -> Result<String, ClipboardError>;
    fn write(&mut self, text: &str) -> Result<(), ClipboardError>;
}

impl<C: Clipboard + ?Sized> Clipboard for &mut C {
    fn read(&mut self) -> Result<String, ClipboardError> {
        (**self).read()
    }

    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        (**self).write(text)
    }
}

/// The OS clipboard. If it cannot be opened every access fails with the
/// original reason, which callers log and move past.
pub struct SystemClipboard {
    inner: Result<arboard::Clipboard, String>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let inner = arboard::Clipboard::new().map_err(|e| e.to_string());
        if let Err(e) = &inner {
            warn!("Failed to initialize clipboard: {}", e);
        }
        SystemClipboard { inner }
    }

    fn handle(&mut self) -> Result<&mut arboard::Clipboard, ClipboardError> {
        self.inner
            .as_mut()
            .map_err(|e| ClipboardError::Unavailable(e.clone()))
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for SystemClipboard {
    fn read(&mut self) -> Result<String, ClipboardError> {
        match self.handle()?.get_text() {
            Ok(text) => Ok(text),
            // An empty clipboard is a perfectly good thing to restore.
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.handle()?.set_text(text)?;
        Ok(())
    }
}

/// Holds the clipboard for the duration of an interactive session and puts
/// back whatever was on it before.
///
/// Restoration is attempted exactly once, either through [`restore`] or, if
/// nothing called it, when the guard is dropped. No write goes through after
/// that.
///
/// [`restore`]: ClipboardGuard::restore
pub struct ClipboardGuard<C: Clipboard> {
    clipboard: C,
    original: String,
    restored: bool,
}

impl<C: Clipboard> ClipboardGuard<C> {
    pub fn acquire(mut clipboard: C) -> Self {
        let original = match clipboard.read() {
            Ok(text) => text,
            Err(e) => {
                warn!("could not read clipboard to preserve: {}", e);
                String::new()
            }
        };
        debug!(bytes = original.len(), "saved clipboard");

        ClipboardGuard {
            clipboard,
            original,
            restored: false,
        }
    }

    /// Put `text` on the clipboard. Failures are logged.
    pub fn write(&mut self, text: &str) {
        if self.restored {
            return;
        }
        if let Err(e) = self.clipboard.write(text) {
            warn!("Failed to copy to clipboard: {}", e);
        }
    }

    /// Put the saved content back. Only the first call touches the
    /// clipboard; later calls return `Ok(false)`.
    pub fn restore(&mut self) -> Result<bool, ClipboardError> {
        if self.restored {
            return Ok(false);
        }
        self.restored = true;
        self.clipboard.write(&self.original)?;
        Ok(true)
    }
}

impl<C: Clipboard> Drop for ClipboardGuard<C> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("could not restore clipboard: {}", e);
        }
    }
}
