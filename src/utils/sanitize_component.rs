// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Produce filesystem-safe file names for exported sections.

/// Fallback stem used when a title sanitizes to nothing.
pub const DEFAULT_STEM: &str = "resultado";

/// Produce a filesystem-safe path component.
///
/// # Steps
/// - Transliterate Unicode to ASCII with `deunicode` (e.g., "Ñ" → "N").
/// - Allow ASCII alphanumerics plus `-`, `_`, `.` and inner spaces; treat other characters as `_`.
/// - Collapse runs of `_`, `.` and spaces; trim leading/trailing dots and spaces.
/// - Guard against reserved/empty names.
///
/// Section titles such as `1 ACUERDO DE DEVOLUCION` keep their spaces, since
/// users recognise exported files by those names.
pub fn sanitize_component(value: &str) -> String {
    let transliterated = deunicode::deunicode(value);
    let mut out = String::with_capacity(transliterated.len());
    let mut last: Option<char> = None;

    for ch in transliterated.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ' ') {
            ch
        } else if ch.is_whitespace() {
            ' '
        } else {
            '_'
        };

        match mapped {
            '_' | '.' | ' ' if last == Some(mapped) => {}
            c => {
                out.push(c);
                last = Some(c);
            }
        }
    }

    // Avoid a stray underscore immediately before a dot.
    while let Some(pos) = out.find("_.") {
        out.remove(pos);
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == ' ');
    let mut out = trimmed.to_string();

    if out.is_empty() {
        return DEFAULT_STEM.to_string();
    }

    // Protect against Windows reserved device names for the basename.
    let (basename, ext) = match out.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base.to_string(), Some(ext.to_string())),
        _ => (out.clone(), None),
    };

    let upper = basename.to_ascii_uppercase();
    let is_reserved = matches!(upper.as_str(), "CON" | "PRN" | "AUX" | "NUL")
        || ((upper.starts_with("COM") || upper.starts_with("LPT"))
            && upper.len() == 4
            && upper.as_bytes()[3].is_ascii_digit()
            && upper.as_bytes()[3] != b'0');

    if is_reserved {
        let mut new_base = basename;
        new_base.push('_');
        out = match ext {
            Some(ext) => format!("{new_base}.{ext}"),
            None => new_base,
        };
    }

    out
}
