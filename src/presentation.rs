//! Presentation layer seam.
//!
//! The bridge never draws anything itself. It reports session transitions as
//! [`Notice`]s to a [`Presenter`], which renders them as a window title and,
//! for failures, a blocking error dialog.

use tracing::{error, info};

const APP_TITLE: &str = "Spectra Client";
const ERROR_DIALOG_TITLE: &str = "Spectra Client - Error";

/// A user-facing state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connecting,
    Authenticating,
    Authenticated { group_code: String },
    AuthRejected,
    Unreachable,
    Closed,
    GameRedetected,
}

impl Notice {
    /// Window title text for this notice.
    pub fn title(&self) -> String {
        let status = match self {
            Self::Connecting => "Connecting...".to_string(),
            Self::Authenticating => "Authenticating...".to_string(),
            Self::Authenticated { group_code } => {
                format!("Connected with Group ID: {}", group_code)
            }
            Self::AuthRejected => "Connection failed, invalid data".to_string(),
            Self::Unreachable => "Connection failed, server not reachable".to_string(),
            Self::Closed => "Connection closed".to_string(),
            Self::GameRedetected => "Valorant re-detected - Ready".to_string(),
        };
        format!("{} | {}", APP_TITLE, status)
    }

    /// Error dialog text, for notices that must block on acknowledgement.
    pub fn dialog(&self) -> Option<&'static str> {
        match self {
            Self::AuthRejected => Some("Inputted data was invalid!"),
            Self::Unreachable => Some("Spectra server not reachable!"),
            _ => None,
        }
    }
}

/// Receives user-facing notifications.
pub trait Presenter {
    fn set_title(&mut self, text: &str);

    fn show_error(&mut self, title: &str, message: &str);

    /// Renders a notice as one title update plus its dialog, if any.
    fn present(&mut self, notice: &Notice) {
        self.set_title(&notice.title());
        if let Some(message) = notice.dialog() {
            self.show_error(ERROR_DIALOG_TITLE, message);
        }
    }
}

/// Presenter for headless runs: titles and dialogs go to the log.
#[derive(Debug, Default)]
pub struct LogPresenter {
    title: String,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent title.
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Presenter for LogPresenter {
    fn set_title(&mut self, text: &str) {
        info!("{}", text);
        self.title = text.to_string();
    }

    fn show_error(&mut self, title: &str, message: &str) {
        error!("{}: {}", title, message);
    }
}
