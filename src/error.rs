use thiserror::Error;

// Every failure the portal client can surface to its caller.
// Per-course problems are reported as CourseParse and never leave the batch.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    // status is None when the request timed out
    #[error("Request to {url} failed (status: {status:?})")]
    Fetch { url: String, status: Option<u16> },

    #[error("Portal did not answer with the expected redirect: {0}")]
    UnexpectedRedirect(String),

    #[error("Malformed career option value: {0:?}")]
    MalformedOption(String),

    #[error("Could not compute grades for course {course:?}: {reason}")]
    CourseParse { course: String, reason: String },

    #[error("Invalid portal URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PortalError {
    // Timeouts are reported as fetch failures so callers treat them like an expired session.
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PortalError::Fetch { url: url.to_string(), status: None }
        } else {
            PortalError::Transport(err)
        }
    }

    pub fn course(course: &str, reason: impl Into<String>) -> Self {
        PortalError::CourseParse { course: course.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
