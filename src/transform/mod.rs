//! Content transforms applied to chapter documents.

pub mod html;
