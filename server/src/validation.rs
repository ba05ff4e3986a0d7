use crate::error::ApiError;

/// Validate a filename requested from the audio directory. Generated names
/// are uuid hex plus an extension, so anything outside that shape is a
/// client error; in particular nothing resembling a path may pass.
pub fn validate_audio_filename(filename: &str) -> Result<(), ApiError> {
    if filename.is_empty() {
        return Err(ApiError::InvalidInput("Invalid audio filename".to_string()));
    }
    let safe = filename
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !safe || filename.starts_with('.') || filename.contains("..") {
        return Err(ApiError::InvalidInput("Invalid audio filename".to_string()));
    }
    Ok(())
}
