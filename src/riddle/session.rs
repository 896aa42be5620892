//! ==============================================================================
//! session.rs - riddle page-state machine
//! ==============================================================================
//!
//! pages:
//! ```text
//!     Landing ──Begin──► Upload ──Confirm(image)──► Reveal
//!                          ▲                          │
//!                          └────────NextCloud─────────┘
//! ```
//!
//! on Reveal: Respond(text) stores the guess, Analysis{Succeeded,Failed}
//! records the outcome of one vision call. a failed analysis only adds an
//! error notice, the page and any earlier results stay as they were.
//!
//! rounds:
//!     every Confirm and NextCloud starts a new round. begin_analysis hands out
//!     the current round number and an analysis outcome must carry it back, so
//!     an answer for a photo that was replaced in the meantime is dropped.
//!     only one analysis per round may be in flight.
//!
//! every other (page, event) pair is rejected and leaves the session untouched.
//!
//! ==============================================================================

use serde::Serialize;
use thiserror::Error;

use super::extract::{top_similarities, Similarity};

pub const WELCOME_TOAST: &str = "A new cloud is available ☁️";
pub const MISSING_IMAGE_WARNING: &str = "Please upload an image first on the 'Image Upload' page.";
pub const CREDENTIALS_HINT: &str = "Unable to generate the riddle. Please check your Replicate credentials.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Page {
    #[default]
    Landing,
    Upload,
    Reveal,
}

/// The photo the user confirmed, kept in memory for the lifetime of the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// image subtype for the data url, e.g. "jpeg" or "png"
    pub format: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Notice {
    Info(String),
    Warning(String),
    Error(String),
}

/// The photo to send to the vision model, tagged with the round it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub round: u64,
    pub image: UploadedImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Confirm(UploadedImage),
    Respond(String),
    AnalysisSucceeded { round: u64, text: String },
    AnalysisFailed { round: u64, message: String },
    NextCloud,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Begin => "begin",
            Event::Confirm(_) => "confirm",
            Event::Respond(_) => "respond",
            Event::AnalysisSucceeded { .. } | Event::AnalysisFailed { .. } => "analysis",
            Event::NextCloud => "next cloud",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("'{event}' is not available on the {page:?} page")]
    NotAllowed { page: Page, event: &'static str },
    #[error("no image has been uploaded")]
    MissingImage,
    #[error("analysis for round {got} arrived during round {current}")]
    StaleRound { got: u64, current: u64 },
    #[error("an analysis is already running for this photo")]
    AnalysisInFlight,
}

#[derive(Debug, Default)]
pub struct Session {
    page: Page,
    uploaded_image: Option<UploadedImage>,
    user_response: String,
    extracted_results: Vec<Similarity>,
    analysis_complete: bool,
    notices: Vec<Notice>,
    welcomed: bool,
    round: u64,
    analysing: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn uploaded_image(&self) -> Option<&UploadedImage> {
        self.uploaded_image.as_ref()
    }

    pub fn user_response(&self) -> &str {
        &self.user_response
    }

    pub fn extracted_results(&self) -> &[Similarity] {
        &self.extracted_results
    }

    pub fn analysis_complete(&self) -> bool {
        self.analysis_complete
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn analysing(&self) -> bool {
        self.analysing
    }

    /// True exactly once per session: the first render shows the welcome toast.
    pub fn take_welcome(&mut self) -> bool {
        if self.welcomed {
            return false;
        }
        self.welcomed = true;
        self.notices.push(Notice::Info(WELCOME_TOAST.to_string()));
        true
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Notices queued since the last render.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Called before rendering. A Reveal page without an image falls back to
    /// Upload with a warning.
    pub fn settle(&mut self) -> Page {
        if self.page == Page::Reveal && self.uploaded_image.is_none() {
            self.notices.push(Notice::Warning(MISSING_IMAGE_WARNING.to_string()));
            self.page = Page::Upload;
        }
        self.page
    }

    /// Claim the vision call for the current round. Fails off the Reveal page,
    /// without an image, or while an earlier call for this round is running.
    pub fn begin_analysis(&mut self) -> Result<AnalysisRequest, TransitionError> {
        if self.page != Page::Reveal {
            return Err(TransitionError::NotAllowed { page: self.page, event: "analysis" });
        }
        let image = self.uploaded_image.clone().ok_or(TransitionError::MissingImage)?;
        if self.analysing {
            return Err(TransitionError::AnalysisInFlight);
        }
        self.analysing = true;
        Ok(AnalysisRequest { round: self.round, image })
    }

    fn check_round(&self, got: u64) -> Result<(), TransitionError> {
        if got != self.round {
            return Err(TransitionError::StaleRound { got, current: self.round });
        }
        Ok(())
    }

    pub fn apply(&mut self, event: Event) -> Result<Page, TransitionError> {
        match (self.page, event) {
            (Page::Landing, Event::Begin) => {
                self.page = Page::Upload;
            }
            (Page::Upload, Event::Confirm(image)) => {
                self.uploaded_image = Some(image);
                self.round += 1;
                self.analysing = false;
                self.page = Page::Reveal;
            }
            (Page::Reveal, Event::Respond(text)) => {
                self.user_response = text;
            }
            (Page::Reveal, Event::AnalysisSucceeded { round, text }) => {
                self.check_round(round)?;
                if self.uploaded_image.is_none() {
                    return Err(TransitionError::MissingImage);
                }
                self.extracted_results = top_similarities(&text);
                self.analysis_complete = true;
                self.analysing = false;
            }
            (Page::Reveal, Event::AnalysisFailed { round, message }) => {
                self.check_round(round)?;
                self.notices.push(Notice::Error(format!("An error occurred: {}", message)));
                self.notices.push(Notice::Info(CREDENTIALS_HINT.to_string()));
                self.analysing = false;
            }
            (Page::Reveal, Event::NextCloud) => {
                self.uploaded_image = None;
                self.user_response.clear();
                self.extracted_results.clear();
                self.analysis_complete = false;
                self.analysing = false;
                self.round += 1;
                self.page = Page::Upload;
            }
            (page, event) => {
                return Err(TransitionError::NotAllowed { page, event: event.name() });
            }
        }
        Ok(self.page)
    }
}

/// Read-only view for the json api.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub page: Page,
    pub has_image: bool,
    pub user_response: String,
    pub extracted_results: Vec<Similarity>,
    pub analysis_complete: bool,
    pub analysing: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            page: session.page,
            has_image: session.uploaded_image.is_some(),
            user_response: session.user_response.clone(),
            extracted_results: session.extracted_results.clone(),
            analysis_complete: session.analysis_complete,
            analysing: session.analysing,
        }
    }
}
