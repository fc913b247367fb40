use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::{Diagnostic, report};
use crate::book::{BookMetadata, DEFAULT_LANGUAGE, DEFAULT_TITLE};
use crate::epub::DublinCore;

/// Build [`BookMetadata`] from the package's Dublin Core elements.
///
/// Single-valued fields take the first non-empty value; list fields keep every
/// non-empty value in source order. Missing title and language fall back to
/// [`DEFAULT_TITLE`] and [`DEFAULT_LANGUAGE`].
pub fn normalize_metadata(dc: &DublinCore, diagnostics: &mut Vec<Diagnostic>) -> BookMetadata {
    let one = |name: &str| {
        dc.all(name)
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string)
    };
    let list = |name: &str| {
        dc.all(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    };

    let date = one("date");
    if let Some(value) = &date
        && !is_recognized_date(value)
    {
        report(
            diagnostics,
            Diagnostic::UnparsableDate {
                value: value.clone(),
            },
        );
    }

    BookMetadata {
        title: one("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        language: one("language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        authors: list("creator"),
        description: one("description"),
        publisher: one("publisher"),
        date,
        identifiers: list("identifier"),
        subjects: list("subject"),
    }
}

/// `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, RFC 3339, or `YYYY-MM-DDTHH:MM:SS`.
pub fn is_recognized_date(value: &str) -> bool {
    let value = value.trim();
    let is_year = |s: &str| s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit());

    if is_year(value) {
        return true;
    }

    if let Some((year, month)) = value.split_once('-')
        && is_year(year)
        && month.len() == 2
        && month.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m))
    {
        return true;
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
}
