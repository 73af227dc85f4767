//! Contains logic for finding out which window currently has focus.
//! [GenericWindowObserver] is the main artifact of this module that abstracts
//! the operations. The observer only reports what the OS knows; browser URLs usually come from
//! the browser feed instead (see [crate::daemon::collection::feed]).

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::Result;
#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindowData {
    /// Name of the owning application, e.g. `chrome.exe` or `nvim`.
    pub app_name: Arc<str>,
    /// Title of the window. For example 'Vibing in YouTube - Google Chrome'
    pub title: Arc<str>,
    /// Page address when the platform can tell it.
    pub url: Option<Arc<str>>,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, automock)]
pub trait WindowObserver {
    /// Returns `None` when no focused window can be determined, e.g. on a locked screen.
    fn active_window(&mut self) -> Result<Option<ActiveWindowData>>;
}

/// Reduces a full executable path to the name users recognize.
pub fn application_name(executable: &str) -> String {
    Path::new(executable)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| executable.to_string())
}

/// Serves as a cross-compatible WindowObserver implementation.
pub struct GenericWindowObserver {
    inner: Box<dyn WindowObserver>,
}

impl GenericWindowObserver {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowObserver;
                Ok(Self {
                    inner: Box::new(WindowsWindowObserver::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowObserver;
                Ok(Self {
                    inner: Box::new(LinuxWindowObserver::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!("No window observer was enabled. Build with the `x11` or `win` feature"))
            }
        }
    }
}

impl WindowObserver for GenericWindowObserver {
    fn active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        self.inner.active_window()
    }
}
