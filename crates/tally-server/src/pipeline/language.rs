//! `Accept-Language` parsing into display names.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageError {
    #[error("missing Accept-Language header")]
    Missing,

    #[error("no usable language tag in {0:?}")]
    NoUsableTag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    /// e.g. `English`.
    pub base: String,
    /// e.g. `English (United Kingdom)`; equal to `base` when no region was sent.
    pub dialect: String,
}

const LANGUAGES: &[(&str, &str)] = &[
    ("af", "Afrikaans"),
    ("ar", "Arabic"),
    ("az", "Azerbaijani"),
    ("be", "Belarusian"),
    ("bg", "Bulgarian"),
    ("bn", "Bengali"),
    ("bs", "Bosnian"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("cy", "Welsh"),
    ("da", "Danish"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("eo", "Esperanto"),
    ("es", "Spanish"),
    ("et", "Estonian"),
    ("eu", "Basque"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fil", "Filipino"),
    ("fr", "French"),
    ("ga", "Irish"),
    ("gl", "Galician"),
    ("gu", "Gujarati"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hr", "Croatian"),
    ("hu", "Hungarian"),
    ("hy", "Armenian"),
    ("id", "Indonesian"),
    ("is", "Icelandic"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ka", "Georgian"),
    ("kk", "Kazakh"),
    ("km", "Khmer"),
    ("kn", "Kannada"),
    ("ko", "Korean"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("mk", "Macedonian"),
    ("ml", "Malayalam"),
    ("mn", "Mongolian"),
    ("mr", "Marathi"),
    ("ms", "Malay"),
    ("mt", "Maltese"),
    ("my", "Burmese"),
    ("nb", "Norwegian Bokmål"),
    ("ne", "Nepali"),
    ("nl", "Dutch"),
    ("nn", "Norwegian Nynorsk"),
    ("no", "Norwegian"),
    ("pa", "Punjabi"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("si", "Sinhala"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("sq", "Albanian"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("sw", "Swahili"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("ur", "Urdu"),
    ("uz", "Uzbek"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
    ("zu", "Zulu"),
];

const REGIONS: &[(&str, &str)] = &[
    ("AR", "Argentina"),
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("BE", "Belgium"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CL", "Chile"),
    ("CN", "China"),
    ("CO", "Colombia"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("EG", "Egypt"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("HK", "Hong Kong"),
    ("IE", "Ireland"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("MX", "Mexico"),
    ("MY", "Malaysia"),
    ("NG", "Nigeria"),
    ("NL", "Netherlands"),
    ("NZ", "New Zealand"),
    ("PE", "Peru"),
    ("PH", "Philippines"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RU", "Russia"),
    ("SA", "Saudi Arabia"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("TR", "Turkey"),
    ("TW", "Taiwan"),
    ("UA", "Ukraine"),
    ("US", "United States"),
    ("VE", "Venezuela"),
    ("ZA", "South Africa"),
    ("419", "Latin America"),
];

fn lookup(table: &[(&str, &'static str)], code: &str) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Picks the highest-weighted tag, first one winning ties, and resolves it
/// to display names. A language the table does not know keeps its code as
/// the name; an unknown region falls back to the bare language name for
/// the dialect.
pub fn parse_accept_language(header: Option<&str>) -> Result<Language, LanguageError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let Some(header) = header else {
        return Err(LanguageError::Missing);
    };

    let mut best: Option<(&str, f32)> = None;
    for part in header.split(',') {
        let mut pieces = part.split(';');
        let tag = pieces.next().map(str::trim).unwrap_or_default();
        if tag.is_empty() || tag == "*" {
            continue;
        }
        let weight = pieces
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);
        if weight <= 0.0 {
            continue;
        }
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((tag, weight));
        }
    }

    let Some((tag, _)) = best else {
        return Err(LanguageError::NoUsableTag(header.to_string()));
    };

    let mut subtags = tag.split(['-', '_']);
    let code = subtags.next().unwrap_or_default().to_ascii_lowercase();
    if !(2..=8).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(LanguageError::NoUsableTag(header.to_string()));
    }
    let base = lookup(LANGUAGES, &code).unwrap_or(code.as_str());

    // Script subtags (`zh-Hant-TW`) are four letters; the region follows them.
    let region = subtags
        .find(|s| s.len() == 2 || (s.len() == 3 && s.chars().all(|c| c.is_ascii_digit())))
        .map(str::to_ascii_uppercase);
    let dialect = match region.as_deref().and_then(|r| lookup(REGIONS, r)) {
        Some(region_name) => format!("{base} ({region_name})"),
        None => base.to_string(),
    };

    Ok(Language {
        base: base.to_string(),
        dialect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_weight_wins() {
        let lang = parse_accept_language(Some("fr;q=0.7, en-GB;q=0.9, de;q=0.8")).expect("parses");
        assert_eq!(lang.base, "English");
        assert_eq!(lang.dialect, "English (United Kingdom)");
    }

    #[test]
    fn implicit_weight_is_one_and_first_tag_wins_ties() {
        let lang = parse_accept_language(Some("pt-BR,en-US;q=0.9,en")).expect("parses");
        assert_eq!(lang.dialect, "Portuguese (Brazil)");
    }

    #[test]
    fn bare_language_uses_base_as_dialect() {
        let lang = parse_accept_language(Some("de")).expect("parses");
        assert_eq!(lang.base, "German");
        assert_eq!(lang.dialect, "German");
    }

    #[test]
    fn script_subtag_is_skipped_when_finding_region() {
        let lang = parse_accept_language(Some("zh-Hant-TW")).expect("parses");
        assert_eq!(lang.dialect, "Chinese (Taiwan)");
        let lang = parse_accept_language(Some("es-419")).expect("parses");
        assert_eq!(lang.dialect, "Spanish (Latin America)");
    }

    #[test]
    fn failures_are_reported() {
        assert_eq!(parse_accept_language(None), Err(LanguageError::Missing));
        assert_eq!(parse_accept_language(Some("  ")), Err(LanguageError::Missing));
        assert!(matches!(
            parse_accept_language(Some("*, en;q=0")),
            Err(LanguageError::NoUsableTag(_))
        ));
        assert!(matches!(
            parse_accept_language(Some("12-GB")),
            Err(LanguageError::NoUsableTag(_))
        ));
    }

    #[test]
    fn unlisted_language_keeps_its_code() {
        let lang = parse_accept_language(Some("am-ET,en;q=0.5")).expect("parses");
        assert_eq!(lang.base, "am");
        assert_eq!(lang.dialect, "am");
        let lang = parse_accept_language(Some("HA-NG")).expect("parses");
        assert_eq!(lang.base, "ha");
        let lang = parse_accept_language(Some("lo-US")).expect("parses");
        assert_eq!(lang.dialect, "lo (United States)");
    }
}
