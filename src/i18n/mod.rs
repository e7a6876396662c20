//! User-facing strings.
//!
//! Uses a simple `t(key)` function for static strings and format helpers
//! (re-exported from `format`) for strings with interpolation.

mod format;
mod languages;


pub use format::*;
pub use languages::language_name;

/// Return the static string for `key`.
pub fn t(key: &str) -> &'static str {
    match key {
        // --- Caption bot ---
        "caption_help" => {
            "Send me a picture and I'll tell you what I see. You can attach an image file, \
             paste an image into the chat, or send me a link to one."
        }
        "caption_help_paste" => {
            "Mention me in a message with an image pasted in, or with a link to an image, \
             and I'll tell you what I see."
        }
        // Sent with the xml text format so markdown leaves the shrug alone.
        "no_caption" => "I'm not sure what that is. \u{00af}\\_(\u{30c4})_/\u{00af}",

        // --- OCR bot ---
        "ocr_help" => {
            "Send me a picture with text in it and I'll read it for you. You can attach an \
             image file, paste an image into the chat, or send me a link to one."
        }
        "ocr_help_paste" => {
            "Mention me in a message with an image pasted in, or with a link to an image, \
             and I'll read the text in it."
        }
        "ocr_no_text" => "I couldn't find any text in that image.",
        "ocr_file_name" => "Recognized text.txt",
        "ocr_file_description" => "Text recognized in your image",
        "ocr_declined" => "OK, I won't send the file.",
        "ocr_expired" => {
            "That result is no longer available. Send me the image again to get a fresh copy."
        }
        _ => "???",
    }
}
