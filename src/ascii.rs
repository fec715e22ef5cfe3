//! UTF-8 to ASCII transliteration for names.
//!
//! Stored names are ASCII-only: `|` is reserved as a field separator and is
//! replaced by a space, `"` is stripped. A character with no ASCII fold makes
//! the whole name unusable; callers count and skip it.

/// Folds one non-ASCII character, "" to drop it, None when unmappable.
fn fold(c: char) -> Option<&'static str> {
    let s = match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'Ä' | 'Æ' => "AE",
        'Ç' | 'Ć' | 'Č' => "C",
        'Ď' | 'Đ' => "D",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'Ğ' => "G",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => "I",
        'Ł' => "L",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' | 'Ō' => "O",
        'Ö' | 'Œ' => "OE",
        'Ŕ' | 'Ř' => "R",
        'Ś' | 'Š' | 'Ş' => "S",
        'Ť' | 'Ţ' => "T",
        'Ù' | 'Ú' | 'Û' | 'Ū' | 'Ů' | 'Ű' => "U",
        'Ü' => "UE",
        'Ý' => "Y",
        'Ź' | 'Ż' | 'Ž' => "Z",
        'à' | 'á' | 'â' | 'ã' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'ä' | 'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'ō' => "o",
        'ö' | 'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ū' | 'ů' | 'ű' => "u",
        'ü' => "ue",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'ß' => "ss",
        'Þ' => "Th",
        'þ' => "th",
        'Ð' => "D",
        'ð' => "d",
        '’' | '‘' | '`' | '´' => "'",
        '“' | '”' => "",
        '–' | '—' | '‐' | '‑' => "-",
        '…' => "...",
        '\u{00a0}' | '\u{2009}' | '\u{200a}' | '\u{2007}' => " ",
        '°' | '\u{200b}' | '\u{feff}' => "",
        _ => return None,
    };
    Some(s)
}

/// ASCII rendition of `s`, or None when a character cannot be folded.
pub fn transliterate(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '|' => out.push(' '),
            '"' => {}
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c if c.is_ascii_control() => out.push(' '),
            c => out.push_str(fold(c)?),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(transliterate("Main Street 5").as_deref(), Some("Main Street 5"));
    }

    #[test]
    fn diacritics_fold() {
        assert_eq!(transliterate("Cañon City").as_deref(), Some("Canon City"));
        assert_eq!(transliterate("Straße").as_deref(), Some("Strasse"));
        assert_eq!(transliterate("Zürich").as_deref(), Some("Zuerich"));
    }

    #[test]
    fn reserved_characters() {
        assert_eq!(transliterate("a|b").as_deref(), Some("a b"));
        assert_eq!(transliterate("\"名前\""), None);
        assert_eq!(transliterate("say \"hi\"").as_deref(), Some("say hi"));
    }

    #[test]
    fn unmappable_is_none() {
        assert_eq!(transliterate("東京"), None);
        assert_eq!(transliterate("Москва"), None);
    }
}
