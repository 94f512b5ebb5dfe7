//! Utilities module - text normalisation shared by grading and reply scanning

pub mod text_utils;

pub use text_utils::TextUtils;
