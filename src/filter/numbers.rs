//! Number-expansion transform: standalone numeric tokens become words so the
//! synthesizer reads "five" instead of spelling a digit. Locale follows the
//! voice profile's language.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::chat::VoiceLanguage;

fn number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // standalone integers and decimals; not parts of words like "mp3"
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap())
}

/// Rewrites every standalone number in `text` to its word form.
///
/// Numbers too large to verbalize are left as digits rather than mangled.
pub fn expand_numbers(text: &str, language: VoiceLanguage) -> String {
    number_pattern()
        .replace_all(text, |caps: &Captures| {
            let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            expand_token(token, language).unwrap_or_else(|| token.to_string())
        })
        .to_string()
}

fn expand_token(token: &str, language: VoiceLanguage) -> Option<String> {
    if let Some((whole, frac)) = token.split_once('.') {
        let whole_words = integer_to_words(whole.parse().ok()?, language)?;
        let frac_words = integer_to_words(frac.parse().ok()?, language)?;
        let point = match language {
            VoiceLanguage::En => "point",
            VoiceLanguage::Ru => "точка",
        };
        Some(format!("{whole_words} {point} {frac_words}"))
    } else {
        integer_to_words(token.parse().ok()?, language)
    }
}

const MAX_EXPANDABLE: u64 = 999_999_999;

fn integer_to_words(n: u64, language: VoiceLanguage) -> Option<String> {
    if n > MAX_EXPANDABLE {
        return None;
    }
    Some(match language {
        VoiceLanguage::En => english(n),
        VoiceLanguage::Ru => russian(n),
    })
}

fn english(n: u64) -> String {
    const ONES: &[&str] = &[
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen",
    ];
    const TENS: &[&str] = &[
        "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
    ];

    if n < 20 {
        return ONES[n as usize].to_string();
    }
    if n < 100 {
        let ten = TENS[(n / 10) as usize];
        return if n % 10 == 0 {
            ten.to_string()
        } else {
            format!("{} {}", ten, ONES[(n % 10) as usize])
        };
    }
    if n < 1_000 {
        let head = format!("{} hundred", english(n / 100));
        return if n % 100 == 0 {
            head
        } else {
            format!("{} {}", head, english(n % 100))
        };
    }
    for (scale, word) in [(1_000_000_u64, "million"), (1_000, "thousand")] {
        if n >= scale {
            let head = format!("{} {}", english(n / scale), word);
            return if n % scale == 0 {
                head
            } else {
                format!("{} {}", head, english(n % scale))
            };
        }
    }
    unreachable!("all magnitudes below MAX_EXPANDABLE are covered")
}

fn russian(n: u64) -> String {
    const ONES: &[&str] = &[
        "ноль",
        "один",
        "два",
        "три",
        "четыре",
        "пять",
        "шесть",
        "семь",
        "восемь",
        "девять",
        "десять",
        "одиннадцать",
        "двенадцать",
        "тринадцать",
        "четырнадцать",
        "пятнадцать",
        "шестнадцать",
        "семнадцать",
        "восемнадцать",
        "девятнадцать",
    ];
    const TENS: &[&str] = &[
        "",
        "",
        "двадцать",
        "тридцать",
        "сорок",
        "пятьдесят",
        "шестьдесят",
        "семьдесят",
        "восемьдесят",
        "девяносто",
    ];
    const HUNDREDS: &[&str] = &[
        "",
        "сто",
        "двести",
        "триста",
        "четыреста",
        "пятьсот",
        "шестьсот",
        "семьсот",
        "восемьсот",
        "девятьсот",
    ];

    if n < 20 {
        return ONES[n as usize].to_string();
    }
    if n < 100 {
        let ten = TENS[(n / 10) as usize];
        return if n % 10 == 0 {
            ten.to_string()
        } else {
            format!("{} {}", ten, ONES[(n % 10) as usize])
        };
    }
    if n < 1_000 {
        let head = HUNDREDS[(n / 100) as usize];
        return if n % 100 == 0 {
            head.to_string()
        } else {
            format!("{} {}", head, russian(n % 100))
        };
    }
    if n < 1_000_000 {
        let thousands = n / 1_000;
        let head = format!(
            "{} {}",
            russian_thousands_count(thousands),
            russian_plural(thousands, "тысяча", "тысячи", "тысяч")
        );
        return if n % 1_000 == 0 {
            head
        } else {
            format!("{} {}", head, russian(n % 1_000))
        };
    }
    let millions = n / 1_000_000;
    let head = format!(
        "{} {}",
        russian(millions),
        russian_plural(millions, "миллион", "миллиона", "миллионов")
    );
    if n % 1_000_000 == 0 {
        head
    } else {
        format!("{} {}", head, russian(n % 1_000_000))
    }
}

/// Thousands take feminine forms for 1 and 2.
fn russian_thousands_count(n: u64) -> String {
    match n {
        1 => "одна".to_string(),
        2 => "две".to_string(),
        n if n % 100 != 11 && n % 100 != 12 && (n % 10 == 1 || n % 10 == 2) => {
            let prefix = russian(n - n % 10);
            let suffix = if n % 10 == 1 { "одна" } else { "две" };
            format!("{prefix} {suffix}")
        }
        _ => russian(n),
    }
}

fn russian_plural(n: u64, one: &'static str, few: &'static str, many: &'static str) -> &'static str {
    let tail = n % 100;
    if (11..=14).contains(&tail) {
        return many;
    }
    match n % 10 {
        1 => one,
        2..=4 => few,
        _ => many,
    }
}
