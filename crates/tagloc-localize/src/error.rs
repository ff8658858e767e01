use tagloc_pnp::PnPError;

/// Errors raised while turning detections into a camera pose.
#[derive(thiserror::Error, Debug)]
pub enum LocalizeError {
    /// No tag was detected in the frame.
    #[error("No tag detections to localise from")]
    NoDetection,

    /// More than one tag was passed to a single-tag solve.
    #[error("Expected exactly one tag detection, got {0}")]
    UnsupportedMultiTag(usize),

    /// The perspective solve did not produce a valid pose.
    #[error("Failed to solve the camera pose. {0}")]
    SolveFailure(#[from] PnPError),

    /// The camera matrix or the distortion coefficients are missing or malformed.
    #[error("Malformed camera intrinsics: {0}")]
    MalformedIntrinsics(String),

    /// Failed to read or write a parameter file.
    #[error("Failed to manipulate the file. {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize a parameter file.
    #[error("Failed to serialize to json. {0}")]
    Json(#[from] serde_json::Error),
}
