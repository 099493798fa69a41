use anyhow::{Result, anyhow};
use isolang::Language;

/// Language hint utilities
///
/// Backends are configured with locale-style hints such as `en-US` or `zh-CN`.
/// The segmenter only needs the primary language, normalized to ISO 639-3, to
/// decide whether text is split into words or into single code points.

/// Atomic unit the segmenter never splits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationUnit {
    /// Whitespace-delimited words
    Word,
    /// Single code points (scripts without word spacing)
    CodePoint,
}

/// ISO 639-3 codes of languages written without spaces between words
const UNSPACED_LANGUAGES: &[&str] = &[
    "zho", "cmn", "yue", "wuu", "hak", "nan", "gan", "hsn", "lzh", // Chinese family
    "jpn", // Japanese
    "tha", "lao", "khm", "mya", // Southeast Asian scripts
    "bod", "dzo", // Tibetan script
];

/// ISO 639-2/B codes that differ from their ISO 639-2/T counterpart
fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        "tib" => "bod",
        _ => return None,
    };
    Some(mapped)
}

/// Extract the primary language subtag from a locale hint (`zh-Hans-CN` -> `zh`)
pub fn primary_subtag(hint: &str) -> String {
    hint.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Normalize a language hint to ISO 639-3 (`en-US` -> `eng`, `chi` -> `zho`)
pub fn normalize_to_part3(hint: &str) -> Result<String> {
    let code = primary_subtag(hint);

    match code.len() {
        2 => Language::from_639_1(&code)
            .map(|lang| lang.to_639_3().to_string())
            .ok_or_else(|| anyhow!("Invalid language hint: {}", hint)),
        3 => {
            if Language::from_639_3(&code).is_some() {
                return Ok(code);
            }
            bibliographic_to_terminology(&code)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("Invalid language hint: {}", hint))
        }
        _ => Err(anyhow!("Invalid language hint: {}", hint)),
    }
}

/// Pick the atomic segmentation unit for a language hint
///
/// Unknown hints fall back to word segmentation, which is safe for any text
/// that uses spaces and degrades to hard splits for text that does not.
pub fn segmentation_unit(hint: &str) -> SegmentationUnit {
    match normalize_to_part3(hint) {
        Ok(code) if UNSPACED_LANGUAGES.contains(&code.as_str()) => SegmentationUnit::CodePoint,
        _ => SegmentationUnit::Word,
    }
}

/// Whether the hint names a Chinese variety (`zh`, `zh-TW`, `yue`, ...)
pub fn is_chinese(hint: &str) -> bool {
    matches!(
        normalize_to_part3(hint).as_deref(),
        Ok("zho" | "cmn" | "yue" | "wuu" | "hak" | "nan" | "gan" | "hsn" | "lzh")
    )
}

/// Get the English language name from a hint
pub fn get_language_name(hint: &str) -> Result<String> {
    let normalized = normalize_to_part3(hint)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}
