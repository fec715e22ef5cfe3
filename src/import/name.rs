//! Name tokenisation, rewrites, capitalisation and abbreviation.
//!
//! A name is read as alternating words (ascii alphabetic runs) and separators
//! (everything else, punctuation and digits included), up to 16 words. The
//! trailing route number of a highway name therefore travels in the last
//! word's separator, which is what the rewrite rules key on.

const MAX_WORDS: usize = 16;

/// Words never capitalised.
const NO_CAPS: &[&str] = &[
    "a", "an", "and", "at", "by", "de", "del", "des", "for", "in", "la", "las", "los", "n", "nd",
    "near", "o", "on", "of", "our", "rd", "s", "st", "t", "th", "the", "to", "via", "with", "y",
];

/// Word -> abbreviated form for the alternate name.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("north", "N"),
    ("south", "S"),
    ("east", "E"),
    ("west", "W"),
    ("northeast", "NE"),
    ("northwest", "NW"),
    ("southeast", "SE"),
    ("southwest", "SW"),
    ("avenue", "Ave"),
    ("boulevard", "Blvd"),
    ("circle", "Cir"),
    ("court", "Ct"),
    ("creek", "Crk"),
    ("crossing", "Xing"),
    ("drive", "Dr"),
    ("expressway", "Expy"),
    ("fort", "Ft"),
    ("freeway", "Fwy"),
    ("heights", "Hts"),
    ("highway", "Hwy"),
    ("junction", "Jct"),
    ("lake", "Lk"),
    ("lane", "Ln"),
    ("mount", "Mt"),
    ("mountain", "Mtn"),
    ("parkway", "Pkwy"),
    ("place", "Pl"),
    ("point", "Pt"),
    ("road", "Rd"),
    ("route", "Rte"),
    ("saint", "St"),
    ("square", "Sq"),
    ("street", "St"),
    ("terrace", "Ter"),
    ("trail", "Trl"),
    ("turnpike", "Tpke"),
    ("village", "Vlg"),
];

#[derive(Debug, Clone, PartialEq)]
struct Token {
    word: String,
    sep: String,
}

#[derive(Debug, Clone, Default)]
struct Tokens {
    lead: String,
    toks: Vec<Token>,
}

fn tokenize(s: &str) -> Tokens {
    let mut out = Tokens::default();
    let mut rest = s;
    // Leading separator, if any.
    let start = rest
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    out.lead = rest[..start].to_string();
    rest = &rest[start..];
    while !rest.is_empty() {
        if out.toks.len() == MAX_WORDS {
            if let Some(last) = out.toks.last_mut() {
                last.sep.push_str(rest);
            }
            break;
        }
        let wend = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let word = rest[..wend].to_string();
        rest = &rest[wend..];
        let send = rest
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let sep = rest[..send].to_string();
        rest = &rest[send..];
        out.toks.push(Token { word, sep });
    }
    out
}

fn join(t: &Tokens) -> String {
    let mut out = t.lead.clone();
    for tok in &t.toks {
        out.push_str(&tok.word);
        out.push_str(&tok.sep);
    }
    out
}

fn word_eq(tok: &Token, w: &str) -> bool {
    tok.word.eq_ignore_ascii_case(w)
}

fn sep_has_digit(tok: &Token) -> bool {
    tok.sep.chars().any(|c| c.is_ascii_digit())
}

/// Replaces tokens `i..i+n` with one word keeping the last separator.
fn splice(t: &mut Tokens, i: usize, n: usize, word: &str) {
    let sep = t.toks[i + n - 1].sep.clone();
    t.toks.drain(i..i + n);
    t.toks.insert(
        i,
        Token {
            word: word.to_string(),
            sep,
        },
    );
}

/// Drops a trailing "13,870 ft" style elevation note.
fn strip_elevation(t: &mut Tokens) {
    let n = t.toks.len();
    if n < 2 {
        return;
    }
    let last = &t.toks[n - 1];
    if !(word_eq(last, "ft") || word_eq(last, "feet")) || !last.sep.trim().is_empty() {
        return;
    }
    if !sep_has_digit(&t.toks[n - 2]) {
        return;
    }
    t.toks.pop();
    let sep = &mut t.toks[n - 2].sep;
    while sep
        .chars()
        .last()
        .map(|c| c.is_ascii_digit() || c == ',' || c == '.' || c == ' ')
        .unwrap_or(false)
    {
        sep.pop();
    }
}

fn rewrite(t: &mut Tokens) -> bool {
    let mut highway = false;
    strip_elevation(t);
    let mut i = 0;
    while i < t.toks.len() {
        let w = |off: usize| t.toks.get(i + off);
        // Multi Use Path / Multi-Use Path
        if let (Some(a), Some(b), Some(c)) = (w(0), w(1), w(2)) {
            if word_eq(a, "multi") && word_eq(b, "use") && word_eq(c, "path") {
                splice(t, i, 3, "MUP");
                i += 1;
                continue;
            }
            if word_eq(a, "united") && word_eq(b, "states") && word_eq(c, "highway") && sep_has_digit(c)
            {
                splice(t, i, 3, "US");
                i += 1;
                continue;
            }
        }
        if let (Some(a), Some(b)) = (w(0), w(1)) {
            if word_eq(a, "multiuse") && word_eq(b, "path") {
                splice(t, i, 2, "MUP");
                i += 1;
                continue;
            }
            if word_eq(a, "us") && (word_eq(b, "highway") || word_eq(b, "hwy")) && sep_has_digit(b) {
                splice(t, i, 2, "US");
                i += 1;
                continue;
            }
            if word_eq(a, "state") && (word_eq(b, "highway") || word_eq(b, "hwy")) && sep_has_digit(b)
            {
                splice(t, i, 2, "Hwy");
                highway = true;
                i += 1;
                continue;
            }
            if word_eq(a, "state") && (word_eq(b, "route") || word_eq(b, "rte")) && sep_has_digit(b) {
                splice(t, i, 2, "Rte");
                highway = true;
                i += 1;
                continue;
            }
            if word_eq(a, "county")
                && (word_eq(b, "road") || word_eq(b, "rd") || word_eq(b, "highway") || word_eq(b, "hwy"))
                && sep_has_digit(b)
            {
                splice(t, i, 2, "CR");
                i += 1;
                continue;
            }
            if word_eq(a, "trail") && word_eq(b, "head") {
                splice(t, i, 2, "TH");
                i += 1;
                continue;
            }
        }
        i += 1;
    }
    highway
}

fn capitalize(t: &mut Tokens) {
    for tok in &mut t.toks {
        let lower = tok.word.to_ascii_lowercase();
        if NO_CAPS.contains(&lower.as_str()) {
            continue;
        }
        if let Some(first) = tok.word.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub name: String,
    /// Set when a generic state-highway name was rewritten; a `ref` tag then
    /// outranks the textual name.
    pub highway: bool,
}

/// Normalises an already-ASCII name. Idempotent.
pub fn normalize(s: &str) -> Normalized {
    let mut t = tokenize(s);
    let highway = rewrite(&mut t);
    capitalize(&mut t);
    let mut name = join(&t);
    name.truncate(name.trim_end().len());
    Normalized { name, highway }
}

/// Alternate abbreviated form, or "" when no word abbreviates.
pub fn abbreviate(s: &str) -> String {
    let mut t = tokenize(s);
    let mut replaced = false;
    for tok in &mut t.toks {
        let lower = tok.word.to_ascii_lowercase();
        if let Some((_, short)) = ABBREVIATIONS.iter().find(|(long, _)| *long == lower) {
            tok.word = (*short).to_string();
            replaced = true;
        }
    }
    if !replaced {
        return String::new();
    }
    let mut name = join(&t);
    name.truncate(name.trim_end().len());
    name
}

/// Elevation in feet from an `ele` / `ele:ft` value; tolerates a trailing
/// "ft" or "feet" token and thousands separators.
pub fn parse_elevation(v: &str, feet: bool) -> Option<i32> {
    let mut s = v.trim();
    for unit in ["feet", "ft", "m"] {
        if let Some(stripped) = s.strip_suffix(unit) {
            s = stripped.trim_end();
            break;
        }
    }
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.trim().parse().ok()?;
    let ft = if feet { value } else { value * 3937.0 / 1200.0 };
    Some(ft.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_highway_rewrite_sets_highway() {
        let n = normalize("State Highway 72");
        assert_eq!(n.name, "Hwy 72");
        assert!(n.highway);
        let n = normalize("State Rte 119");
        assert_eq!(n.name, "Rte 119");
        assert!(n.highway);
    }

    #[test]
    fn us_and_county_rewrites() {
        assert_eq!(normalize("United States Highway 6").name, "US 6");
        assert_eq!(normalize("US Highway 36").name, "US 36");
        assert_eq!(normalize("County Road 126").name, "CR 126");
        assert_eq!(normalize("county rd 12").name, "CR 12");
        assert!(!normalize("US Highway 36").highway);
    }

    #[test]
    fn mup_and_trail_head() {
        assert_eq!(normalize("Multi Use Path").name, "MUP");
        assert_eq!(normalize("Multi-Use Path").name, "MUP");
        assert_eq!(normalize("Multiuse Path").name, "MUP");
        assert_eq!(normalize("Bear Creek Trail Head").name, "Bear Creek TH");
    }

    #[test]
    fn elevation_noise_is_stripped() {
        assert_eq!(normalize("Mount Elbert 14,440 ft").name, "Mount Elbert");
        assert_eq!(normalize("Grays Peak 14270 feet").name, "Grays Peak");
        // A name that merely ends in ft-the-word keeps it.
        assert_eq!(normalize("Fort ft").name, "Fort Ft");
    }

    #[test]
    fn capitalisation_respects_no_caps_list() {
        assert_eq!(normalize("garden of the gods").name, "Garden of the Gods");
        assert_eq!(normalize("isla de la luna").name, "Isla de la Luna");
    }

    #[test]
    fn normalize_is_idempotent() {
        for s in [
            "State Highway 72",
            "United States Highway 6",
            "Multi-Use Path",
            "garden of the gods",
            "Mount Elbert 14,440 ft",
            "E 5th Ave",
            "US 36",
        ] {
            let once = normalize(s);
            let twice = normalize(&once.name);
            assert_eq!(once.name, twice.name, "input {s:?}");
        }
    }

    #[test]
    fn abbreviation_empty_when_nothing_abbreviates() {
        assert_eq!(abbreviate("MUP"), "");
        assert_eq!(abbreviate("Dillon"), "");
        assert_eq!(abbreviate("Colfax Avenue"), "Colfax Ave");
        assert_eq!(abbreviate("North Table Mountain"), "N Table Mtn");
    }

    #[test]
    fn elevation_parsing() {
        assert_eq!(parse_elevation("4401", false), Some(14_439));
        assert_eq!(parse_elevation("14440", true), Some(14_440));
        assert_eq!(parse_elevation("14,440 ft", true), Some(14_440));
        assert_eq!(parse_elevation("4401 m", false), Some(14_439));
        assert_eq!(parse_elevation("high", false), None);
    }

    #[test]
    fn word_limit_keeps_remainder() {
        let long = "a b c d e f g h i j k l m n o p q r s";
        let n = normalize(long);
        assert!(n.name.ends_with("q r s"));
    }
}
