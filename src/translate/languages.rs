use crate::error::{Result, TtError};

/// Languages the transcriber recognises, with their ISO-639-1 codes
pub const TRANSCRIPTION_LANGUAGES: [(&str, &str); 57] = [
    ("Afrikaans", "af"),
    ("Arabic", "ar"),
    ("Armenian", "hy"),
    ("Azerbaijani", "az"),
    ("Belarusian", "be"),
    ("Bosnian", "bs"),
    ("Bulgarian", "bg"),
    ("Catalan", "ca"),
    ("Chinese", "zh"),
    ("Croatian", "hr"),
    ("Czech", "cs"),
    ("Danish", "da"),
    ("Dutch", "nl"),
    ("English", "en"),
    ("Estonian", "et"),
    ("Finnish", "fi"),
    ("French", "fr"),
    ("Galician", "gl"),
    ("German", "de"),
    ("Greek", "el"),
    ("Hebrew", "he"),
    ("Hindi", "hi"),
    ("Hungarian", "hu"),
    ("Icelandic", "is"),
    ("Indonesian", "id"),
    ("Italian", "it"),
    ("Japanese", "ja"),
    ("Kannada", "kn"),
    ("Kazakh", "kk"),
    ("Korean", "ko"),
    ("Latvian", "lv"),
    ("Lithuanian", "lt"),
    ("Macedonian", "mk"),
    ("Malay", "ms"),
    ("Maori", "mi"),
    ("Marathi", "mr"),
    ("Nepali", "ne"),
    ("Norwegian", "no"),
    ("Persian", "fa"),
    ("Polish", "pl"),
    ("Portuguese", "pt"),
    ("Romanian", "ro"),
    ("Russian", "ru"),
    ("Serbian", "sr"),
    ("Slovak", "sk"),
    ("Slovenian", "sl"),
    ("Spanish", "es"),
    ("Swahili", "sw"),
    ("Swedish", "sv"),
    ("Tagalog", "tl"),
    ("Tamil", "ta"),
    ("Thai", "th"),
    ("Turkish", "tr"),
    ("Ukrainian", "uk"),
    ("Urdu", "ur"),
    ("Vietnamese", "vi"),
    ("Welsh", "cy"),
];

/// Translation language: display name, source code, target code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationLanguage {
    pub name: &'static str,
    pub source: &'static str,
    pub target: &'static str,
}

const fn lang(name: &'static str, source: &'static str, target: &'static str) -> TranslationLanguage {
    TranslationLanguage { name, source, target }
}

pub const TRANSLATION_LANGUAGES: [TranslationLanguage; 29] = [
    lang("Bulgarian", "BG", "BG"),
    lang("Chinese", "ZH", "ZH"),
    lang("Czech", "CS", "CS"),
    lang("Danish", "DA", "DA"),
    lang("Dutch", "NL", "NL"),
    lang("English", "EN", "EN-US"),
    lang("Estonian", "ET", "ET"),
    lang("Finnish", "FI", "FI"),
    lang("French", "FR", "FR"),
    lang("German", "DE", "DE"),
    lang("Greek", "EL", "EL"),
    lang("Hungarian", "HU", "HU"),
    lang("Indonesian", "ID", "ID"),
    lang("Italian", "IT", "IT"),
    lang("Japanese", "JA", "JA"),
    lang("Korean", "KO", "KO"),
    lang("Latvian", "LV", "LV"),
    lang("Lithuanian", "LT", "LT"),
    lang("Norwegian", "NB", "NB"),
    lang("Polish", "PL", "PL"),
    lang("Portuguese", "PT", "PT-PT"),
    lang("Romanian", "RO", "RO"),
    lang("Russian", "RU", "RU"),
    lang("Slovak", "SK", "SK"),
    lang("Slovenian", "SL", "SL"),
    lang("Spanish", "ES", "ES"),
    lang("Swedish", "SV", "SV"),
    lang("Turkish", "TR", "TR"),
    lang("Ukrainian", "UK", "UK"),
];

/// ISO code for the transcriber's `--language`. Accepts a name or a code;
/// `auto` passes through.
pub fn transcription_code(language: &str) -> Result<&'static str> {
    let language = language.trim();
    if language.eq_ignore_ascii_case("auto") {
        return Ok("auto");
    }
    TRANSCRIPTION_LANGUAGES
        .iter()
        .find(|(name, code)| name.eq_ignore_ascii_case(language) || code.eq_ignore_ascii_case(language))
        .map(|(_, code)| *code)
        .ok_or_else(|| TtError::Config(format!("Unsupported transcription language: {}", language)))
}

/// Display name for a transcription language given by name or code
pub fn transcription_name(language: &str) -> Result<&'static str> {
    let language = language.trim();
    if language.eq_ignore_ascii_case("auto") {
        return Ok("auto");
    }
    TRANSCRIPTION_LANGUAGES
        .iter()
        .find(|(name, code)| name.eq_ignore_ascii_case(language) || code.eq_ignore_ascii_case(language))
        .map(|(name, _)| *name)
        .ok_or_else(|| TtError::Config(format!("Unsupported transcription language: {}", language)))
}

/// Look up a translation language by name, source code or target code
pub fn translation_language(language: &str) -> Result<&'static TranslationLanguage> {
    let language = language.trim();
    TRANSLATION_LANGUAGES
        .iter()
        .find(|lang| {
            lang.name.eq_ignore_ascii_case(language)
                || lang.source.eq_ignore_ascii_case(language)
                || lang.target.eq_ignore_ascii_case(language)
        })
        .ok_or_else(|| TtError::Config(format!("Unsupported translation language: {}", language)))
}
