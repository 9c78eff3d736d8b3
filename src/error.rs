use std::fmt;

use thiserror::Error;

/// Why a job did not reach the committed state.
///
/// `Display` is meant for logs and may contain raw engine output.
/// Anything shown to a caller goes through [`JobError::user_message`].
#[derive(Error, Debug)]
pub enum JobError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("acquisition failed ({category}): {detail}")]
    Acquisition {
        category: AcquisitionFailure,
        detail: String,
    },
    #[error("processing failed: {0}")]
    Processing(String),
    #[error("commit failed: {0}")]
    Commit(String),
}

impl JobError {
    pub fn acquisition(category: AcquisitionFailure, detail: impl Into<String>) -> Self {
        JobError::Acquisition {
            category,
            detail: detail.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            JobError::Validation(msg) => msg.clone(),
            JobError::Acquisition { category, .. } => category.user_message().to_string(),
            JobError::Processing(_) => "Failed to process audio".to_string(),
            JobError::Commit(_) => "Failed to save song metadata".to_string(),
        }
    }
}

/// Coarse buckets for a failed acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionFailure {
    Network,
    Restricted,
    NotFound,
    AgeRestricted,
    Ambiguous,
    LocalStorage,
    Unknown,
}

impl AcquisitionFailure {
    /// Buckets raw extractor output by the first matching keyword group.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| raw.contains(n));

        if has(&["network", "connection"]) {
            AcquisitionFailure::Network
        } else if has(&["permission", "forbidden", "http error 403"]) {
            AcquisitionFailure::Restricted
        } else if has(&["not found", "404"]) {
            AcquisitionFailure::NotFound
        } else if has(&["age-restricted", "age restricted", "confirm your age", "login", "sign in"]) {
            AcquisitionFailure::AgeRestricted
        } else {
            AcquisitionFailure::Unknown
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            AcquisitionFailure::Network => "Network error: Unable to connect to the remote source",
            AcquisitionFailure::Restricted => "Permission error: Track may be private or restricted",
            AcquisitionFailure::NotFound => "Track not found: Please check the URL",
            AcquisitionFailure::AgeRestricted => "Track is age-restricted or requires login",
            AcquisitionFailure::Ambiguous => "Downloaded file not found",
            AcquisitionFailure::LocalStorage => "Failed to save file",
            AcquisitionFailure::Unknown => "Failed to download track",
        }
    }
}

impl fmt::Display for AcquisitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionFailure::Network => "network",
            AcquisitionFailure::Restricted => "restricted",
            AcquisitionFailure::NotFound => "not-found",
            AcquisitionFailure::AgeRestricted => "age-restricted",
            AcquisitionFailure::Ambiguous => "ambiguous",
            AcquisitionFailure::LocalStorage => "local-storage",
            AcquisitionFailure::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
