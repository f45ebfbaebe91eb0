use async_trait::async_trait;
use thiserror::Error;

use crate::core::schedule::PageInfo;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no active page to schedule")]
    NoActivePage,

    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },
}

/// What the controller needs from the surface it runs in.
#[async_trait]
pub trait HostSurface: Send + Sync {
    /// The page the user is looking at, if any.
    async fn active_page(&self) -> Option<PageInfo>;

    /// Open `url` for the user (a new tab, a browser window...).
    async fn open_url(&self, url: &str) -> Result<(), HostError>;
}

/// Host for the command line: the "active page" is whatever was passed in,
/// and links are opened with the configured browser command.
#[derive(Debug, Clone)]
pub struct CliHost {
    page: Option<PageInfo>,
    browser_command: String,
}

impl CliHost {
    pub fn new(browser_command: impl Into<String>) -> Self {
        Self {
            page: None,
            browser_command: browser_command.into(),
        }
    }

    pub fn with_page(mut self, page: PageInfo) -> Self {
        self.page = Some(page);
        self
    }
}

#[async_trait]
impl HostSurface for CliHost {
    async fn active_page(&self) -> Option<PageInfo> {
        self.page.clone()
    }

    async fn open_url(&self, url: &str) -> Result<(), HostError> {
        log::info!("Opening {} with {}", url, self.browser_command);
        let status = tokio::process::Command::new(&self.browser_command)
            .arg(url)
            .status()
            .await
            .map_err(|e| HostError::Open {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(HostError::Open {
                url: url.to_string(),
                reason: format!("{} exited with {}", self.browser_command, status),
            })
        }
    }
}
