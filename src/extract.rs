//! Product-code extraction from aggregated OCR text.
//!
//! Rules, first non-empty result wins:
//! 1. the first run of digits, whitespace and hyphens that contains a digit
//!    (separators inside the run are kept, e.g. `"100 002"`);
//! 2. the first run of plain digits anywhere in the text;
//! 3. the empty string.
//!
//! Letters break a run: the whitespace-delimited piece of a run that touches a
//! letter belongs to a word such as `M8x20` and is not part of a code.
//!
//! "First run wins" is deliberate. When OCR noise puts a stray digit run in
//! front of the real code the wrong run is returned.

/// Best-effort code candidate; empty when the text holds no digits.
pub fn extract(text: &str) -> String {
    separated_run(text)
        .or_else(|| first_digit_run(text))
        .unwrap_or_default()
}

fn is_run_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_whitespace() || c == '-'
}

fn separated_run(text: &str) -> Option<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        if !is_run_char(chars[i].1) {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && is_run_char(chars[i].1) {
            i += 1;
        }
        let before = start.checked_sub(1).map(|j| chars[j].1);
        let after = chars.get(i).map(|&(_, c)| c);
        let begin = chars[start].0;
        let end = chars.get(i).map_or(text.len(), |&(b, _)| b);
        if let Some(code) = detach_words(&text[begin..end], before, after) {
            return Some(code);
        }
    }
    None
}

/// Drop the edge pieces of `run` glued to a neighbouring letter, then trim.
fn detach_words(run: &str, before: Option<char>, after: Option<char>) -> Option<String> {
    let mut run = run;
    if before.is_some_and(char::is_alphabetic) {
        run = &run[run.find(char::is_whitespace)?..];
    }
    if after.is_some_and(char::is_alphabetic) {
        run = &run[..run.rfind(char::is_whitespace)?];
    }
    let run = run.trim();
    run.chars()
        .any(|c| c.is_ascii_digit())
        .then(|| run.to_string())
}

fn first_digit_run(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let len = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(rest[..len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_digit_string_is_returned_whole() {
        assert_eq!(extract("12345"), "12345");
        assert_eq!(extract("007"), "007");
    }

    #[test]
    fn keeps_internal_spacing() {
        assert_eq!(extract("100 002"), "100 002");
    }

    #[test]
    fn keeps_hyphenated_codes() {
        assert_eq!(extract("Ref 100-002 caja"), "100-002");
    }

    #[test]
    fn skips_digits_inside_words() {
        assert_eq!(extract("Tornillo M8x20 12345 €0.50"), "12345");
    }

    #[test]
    fn newline_joined_fragments_form_one_run() {
        assert_eq!(extract("Tuerca M10\n67890\n€0.75"), "67890");
        assert_eq!(extract("100\n002"), "100\n002");
    }

    #[test]
    fn run_continues_across_separate_number_groups() {
        assert_eq!(extract("100 002 10566"), "100 002 10566");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(extract("  \t 54321 \n"), "54321");
    }

    #[test]
    fn falls_back_to_digits_inside_words() {
        assert_eq!(extract("SKU:AB123X"), "123");
        assert_eq!(extract("M8x20"), "8");
    }

    #[test]
    fn no_digits_means_empty() {
        assert_eq!(extract("Cable acero"), "");
        assert_eq!(extract(""), "");
        assert_eq!(extract(" - - "), "");
    }

    #[test]
    fn punctuation_does_not_glue() {
        assert_eq!(extract("Código: 22222."), "22222");
    }

    // Accuracy ceiling: a spurious leading digit run hides the real code.
    #[test]
    fn spurious_leading_run_wins() {
        assert_eq!(extract("7 Rodamiento 11111"), "7");
        assert_eq!(extract("€0.50 12345"), "0");
    }
}
