//! Identifier extraction and OCR correction
//!
//! Pulls container numbers, ISO size/type codes and plates out of raw
//! provider text. The only correction ever applied is a single-character
//! digit-to-letter substitution at the third position of an ISO code.

use std::sync::LazyLock;

use regex::Regex;

use super::types::ExtractionField;

/// Confidence for a value that matched its pattern as-is
pub const EXACT_MATCH_CONFIDENCE: f32 = 0.95;

/// Confidence for a value fixed through the confusion table
pub const CORRECTED_CONFIDENCE: f32 = 0.80;

// Digits are ASCII only; `\d` would also accept fullwidth and other scripts.

/// Owner code, 6-7 serial digits, optional check digit. A longer digit run
/// does not match at all.
static CONTAINER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{4}\s*[0-9]{6,7}(?:\s*[0-9])?\b").expect("container number pattern")
});

/// Two digits, letter, digit (e.g. 22G1)
static ISO_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{2}[A-Z][0-9]\b").expect("ISO code pattern"));

/// Standalone four-digit group, a candidate for a misread ISO code
static ISO_DIGIT_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9]{4}\b").expect("ISO candidate pattern"));

/// Digit-to-letter confusions OCR commonly makes on the ISO type letter
pub fn ocr_confusion(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '5' => Some('S'),
        '6' => Some('G'),
        '8' => Some('B'),
        _ => None,
    }
}

/// Format-aware extraction of identifiers from OCR text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCorrector;

impl TextCorrector {
    pub fn new() -> Self {
        Self
    }

    /// First container number in `text`, with internal whitespace removed
    pub fn extract_container_number(&self, text: &str) -> ExtractionField {
        let upper = text.to_uppercase();
        match CONTAINER_NUMBER.find(&upper) {
            Some(m) => {
                let raw = m.as_str().to_string();
                let canonical: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                ExtractionField {
                    raw_value: raw,
                    corrected_value: canonical,
                    confidence: EXACT_MATCH_CONFIDENCE,
                    was_corrected: false,
                    provider: None,
                }
            }
            None => ExtractionField::empty(),
        }
    }

    /// ISO size/type code.
    ///
    /// Falls back to four-digit groups whose third character is a known
    /// confusion; only that one character is ever replaced.
    pub fn extract_iso_code(&self, text: &str) -> ExtractionField {
        let upper = text.to_uppercase();

        if let Some(m) = ISO_CODE.find(&upper) {
            return ExtractionField {
                raw_value: m.as_str().to_string(),
                corrected_value: m.as_str().to_string(),
                confidence: EXACT_MATCH_CONFIDENCE,
                was_corrected: false,
                provider: None,
            };
        }

        for m in ISO_DIGIT_CANDIDATE.find_iter(&upper) {
            let candidate = m.as_str();
            if let Some(corrected) = correct_third_character(candidate) {
                return ExtractionField {
                    raw_value: candidate.to_string(),
                    corrected_value: corrected,
                    confidence: CORRECTED_CONFIDENCE,
                    was_corrected: true,
                    provider: None,
                };
            }
        }

        ExtractionField::empty()
    }

    /// Plate text, upper-cased and otherwise untouched
    pub fn extract_plate(&self, text: &str) -> ExtractionField {
        let plate = text.trim().to_uppercase();
        if plate.is_empty() {
            return ExtractionField::empty();
        }
        ExtractionField {
            raw_value: text.trim().to_string(),
            corrected_value: plate,
            confidence: EXACT_MATCH_CONFIDENCE,
            was_corrected: false,
            provider: None,
        }
    }
}

fn correct_third_character(candidate: &str) -> Option<String> {
    let mut chars: Vec<char> = candidate.chars().collect();
    let replacement = ocr_confusion(*chars.get(2)?)?;
    chars[2] = replacement;
    Some(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_number_with_spaces() {
        let corrector = TextCorrector::new();
        let field = corrector.extract_container_number("MSCU 123456 7");

        assert_eq!(field.corrected_value, "MSCU1234567");
        assert_eq!(field.raw_value, "MSCU 123456 7");
        assert_eq!(field.confidence, 0.95);
        assert!(!field.was_corrected);
    }

    #[test]
    fn test_container_number_in_noisy_text() {
        let corrector = TextCorrector::new();

        let field = corrector.extract_container_number("max gross 30480\nmscu1234567 22G1");
        assert_eq!(field.corrected_value, "MSCU1234567");

        let field = corrector.extract_container_number("TGHU 987654 22G1");
        assert_eq!(field.corrected_value, "TGHU987654");

        let field = corrector.extract_container_number("CSQU3054383\nTGHU1234567");
        assert_eq!(field.corrected_value, "CSQU3054383");
    }

    #[test]
    fn test_container_number_adjacent_check_digit() {
        let corrector = TextCorrector::new();

        let field = corrector.extract_container_number("MSCU12345678");
        assert_eq!(field.corrected_value, "MSCU12345678");

        let field = corrector.extract_container_number("MSCU 1234567 8");
        assert_eq!(field.corrected_value, "MSCU12345678");
    }

    #[test]
    fn test_container_number_rejects_overlong_digit_run() {
        let corrector = TextCorrector::new();

        let field = corrector.extract_container_number("MSCU123456789");
        assert!(field.is_empty());
        assert_eq!(field.confidence, 0.0);
    }

    #[test]
    fn test_non_ascii_digits_are_not_identifiers() {
        let corrector = TextCorrector::new();

        assert!(corrector.extract_iso_code("２２G１").is_empty());

        let field = corrector.extract_iso_code("٤٢5١");
        assert!(field.is_empty());
        assert!(!field.was_corrected);

        assert!(corrector.extract_container_number("MSCU１２３４５６７").is_empty());
    }

    #[test]
    fn test_container_number_missing() {
        let corrector = TextCorrector::new();

        let field = corrector.extract_container_number("MAX GROSS 30480 KG");
        assert!(field.is_empty());
        assert_eq!(field.confidence, 0.0);

        assert!(corrector.extract_container_number("MSC 12345").is_empty());
        assert!(corrector.extract_container_number("").is_empty());
    }

    #[test]
    fn test_iso_code_exact() {
        let corrector = TextCorrector::new();
        let field = corrector.extract_iso_code("MSCU1234567 22G1");

        assert_eq!(field.corrected_value, "22G1");
        assert_eq!(field.confidence, 0.95);
        assert!(!field.was_corrected);

        assert_eq!(corrector.extract_iso_code("45r1").corrected_value, "45R1");
    }

    #[test]
    fn test_iso_code_confusion_correction() {
        let corrector = TextCorrector::new();
        let field = corrector.extract_iso_code("4251");

        assert_eq!(field.raw_value, "4251");
        assert_eq!(field.corrected_value, "42S1");
        assert_eq!(field.confidence, 0.80);
        assert!(field.was_corrected);
    }

    #[test]
    fn test_iso_code_every_confusion() {
        let corrector = TextCorrector::new();
        assert_eq!(corrector.extract_iso_code("2201").corrected_value, "22O1");
        assert_eq!(corrector.extract_iso_code("2211").corrected_value, "22I1");
        assert_eq!(corrector.extract_iso_code("2261").corrected_value, "22G1");
        assert_eq!(corrector.extract_iso_code("2281").corrected_value, "22B1");
    }

    #[test]
    fn test_iso_code_only_third_position() {
        let corrector = TextCorrector::new();

        // Third char '3' has no confusion entry even though others do
        let field = corrector.extract_iso_code("5031");
        assert!(field.is_empty());
        assert!(!field.was_corrected);

        // First qualifying candidate wins
        let field = corrector.extract_iso_code("1234 4561 2281");
        assert_eq!(field.corrected_value, "45G1");
    }

    #[test]
    fn test_iso_code_ignores_container_serial_digits() {
        let corrector = TextCorrector::new();
        let field = corrector.extract_iso_code("MSCU 125456 7");
        assert!(field.is_empty());
    }

    #[test]
    fn test_plate_is_verbatim_uppercase() {
        let corrector = TextCorrector::new();

        let field = corrector.extract_plate(" 7abc123 ");
        assert_eq!(field.corrected_value, "7ABC123");
        assert!(!field.was_corrected);

        // No O/0 style correction for plates
        let field = corrector.extract_plate("8o0-b8");
        assert_eq!(field.corrected_value, "8O0-B8");

        assert!(corrector.extract_plate("   ").is_empty());
    }
}
