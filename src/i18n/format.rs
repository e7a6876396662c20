//! Format helpers for strings with interpolation.

/// Caption for a described image.
pub fn caption_response(caption: &str) -> String {
    format!("I think it's {caption}.")
}

/// The image could not be fetched or analyzed.
pub fn analysis_error(reason: &str) -> String {
    format!("Sorry, I couldn't analyze that image: {reason}")
}

/// Text was recognized; `language` is the display name of the detected language.
pub fn ocr_text_found(language: &str) -> String {
    format!("I found some text in the image ({language}). Accept the file below to get a copy.")
}

/// The consent upload did not complete.
pub fn ocr_upload_error(reason: &str) -> String {
    format!("Sorry, I couldn't upload the file: {reason}")
}
