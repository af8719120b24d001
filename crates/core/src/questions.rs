use crate::chunking::normalize_whitespace;
use crate::error::IngestError;
use crate::models::{PdfDocument, Question};
use regex::Regex;

const QUESTION_MARKER: &str = r"(?:\b(?:Q\.?\s*|Question\s+)(\d+)[.):]?|(?m:^)[ \t]*(\d+)[.)])\s*";
const OPTION_MARKER: &str = r"\(?([A-D])\)[\s:]+";
const MIN_STEM_CHARS: usize = 10;

/// Questions of one extracted paper, dated and labelled from its file name.
pub fn questions_from_document(document: &PdfDocument) -> Result<Vec<Question>, IngestError> {
    let year = extract_year_from_filename(&document.file_name)?;
    let paper_set = extract_set_from_filename(&document.file_name)?;
    parse_questions(&document.full_text(), year, &paper_set)
}

/// Splits exam text on question numbers (`Q.1`, `Q 1`, `Question 1`, `1.`, `1)`)
/// and pulls MCQ options out of each question body.
pub fn parse_questions(text: &str, year: u16, paper_set: &str) -> Result<Vec<Question>, IngestError> {
    let marker = Regex::new(QUESTION_MARKER)?;
    let option_marker = Regex::new(OPTION_MARKER)?;

    let markers = marker.captures_iter(text).collect::<Vec<_>>();
    let mut questions = Vec::new();

    for (position, captures) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (captures.get(0), captures.get(1).or(captures.get(2))) else {
            continue;
        };
        let body_end = markers
            .get(position + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(text.len());
        let body = text[whole.end()..body_end].trim();
        if body.is_empty() {
            continue;
        }

        let markers = option_markers(body, &option_marker);
        let options = collect_options(body, &markers);
        let stem = match markers.first() {
            Some(first) if !options.is_empty() => &body[..first.start],
            _ => body,
        };
        let stem = normalize_whitespace(stem);

        if stem.chars().count() < MIN_STEM_CHARS {
            continue;
        }

        let Ok(number) = number.as_str().parse::<u32>() else {
            continue;
        };

        questions.push(Question {
            number,
            text: stem,
            options,
            year,
            paper_set: paper_set.to_string(),
            answer: String::new(),
            difficulty: 0,
            marks: 1,
            subject: None,
            topic: None,
        });
    }

    Ok(questions)
}

pub fn extract_options(text: &str) -> Result<Vec<String>, IngestError> {
    let option_marker = Regex::new(OPTION_MARKER)?;
    Ok(collect_options(text, &option_markers(text, &option_marker)))
}

struct OptionMarker {
    start: usize,
    end: usize,
    letter: char,
}

/// Option markers that open a word and run A, B, C, D in order, so a stray
/// `C)` inside a stem like `R(A, B, C)` is left as text.
fn option_markers(text: &str, option_marker: &Regex) -> Vec<OptionMarker> {
    let mut expected = 'A';
    let mut markers = Vec::new();

    for captures in option_marker.captures_iter(text) {
        let (Some(whole), Some(letter)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let opens_word = text[..whole.start()]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let letter = letter.as_str().chars().next().unwrap_or_default();
        if !opens_word || letter != expected {
            continue;
        }

        markers.push(OptionMarker {
            start: whole.start(),
            end: whole.end(),
            letter,
        });
        expected = char::from(expected as u8 + 1);
    }

    markers
}

fn collect_options(text: &str, markers: &[OptionMarker]) -> Vec<String> {
    let mut options = Vec::new();

    for (position, marker) in markers.iter().enumerate() {
        let end = markers
            .get(position + 1)
            .map_or(text.len(), |next| next.start);
        let option_text = normalize_whitespace(&text[marker.end..end]);
        if !option_text.is_empty() {
            options.push(format!("({}) {}", marker.letter, option_text));
        }
    }

    options
}

/// Reads the option letter out of `"B"`, `"(B) text"` or `"b)"`.
pub fn answer_letter(answer: &str) -> Option<char> {
    let trimmed = answer.trim().trim_start_matches('(');
    let mut chars = trimmed.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !('A'..='D').contains(&letter) {
        return None;
    }
    match chars.next() {
        None | Some(')') | Some('.') | Some(':') => Some(letter),
        Some(next) if next.is_whitespace() => Some(letter),
        _ => None,
    }
}

pub fn extract_year_from_filename(filename: &str) -> Result<u16, IngestError> {
    let year = Regex::new(r"(20\d{2})")?;
    Ok(year
        .captures(filename)
        .and_then(|captures| captures.get(1))
        .and_then(|found| found.as_str().parse().ok())
        .unwrap_or(0))
}

pub fn extract_set_from_filename(filename: &str) -> Result<String, IngestError> {
    let set = Regex::new(r"(?i)set[_\-\s]*([0-9a-z]+)")?;
    Ok(set
        .captures(filename)
        .and_then(|captures| captures.get(1))
        .map(|found| format!("Set-{}", found.as_str()))
        .unwrap_or_else(|| "Unknown".to_string()))
}

/// Collapses whitespace and drops everything except word characters and basic punctuation.
pub fn clean_text(text: &str) -> Result<String, IngestError> {
    let disallowed = Regex::new(r#"[^\w\s.,!?;:()\-'"]+"#)?;
    Ok(normalize_whitespace(&disallowed.replace_all(text, "")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageText;
    use chrono::Utc;

    const PAPER: &str = "GATE 2023 CS\n\
        Q.1 Which of the following is a synchronization primitive?\n\
        (A) Semaphore (B) Page table\n(C) TLB (D) Inode\n\
        Q.2 Consider a system with paging where the page size is 4KB.\n\
        Q.3 Ok?\n";

    #[test]
    fn questions_are_split_on_markers_with_options() -> Result<(), IngestError> {
        let questions = parse_questions(PAPER, 2023, "Set-1")?;

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].number, 1);
        assert_eq!(
            questions[0].text,
            "Which of the following is a synchronization primitive?"
        );
        assert_eq!(
            questions[0].options,
            vec!["(A) Semaphore", "(B) Page table", "(C) TLB", "(D) Inode"]
        );
        assert_eq!(questions[0].year, 2023);
        assert_eq!(questions[0].paper_set, "Set-1");
        assert_eq!(questions[0].marks, 1);
        assert!(questions[1].options.is_empty());
        Ok(())
    }

    #[test]
    fn short_stems_are_dropped() -> Result<(), IngestError> {
        let questions = parse_questions("1. Long enough stem\n2) Tiny", 2020, "Set-2")?;
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].number, 1);
        assert_eq!(questions[0].text, "Long enough stem");
        Ok(())
    }

    #[test]
    fn options_accept_bare_and_colon_markers() -> Result<(), IngestError> {
        let options = extract_options("A) first choice B): second\nchoice")?;
        assert_eq!(options, vec!["(A) first choice", "(B) second choice"]);
        Ok(())
    }

    #[test]
    fn parenthesised_letters_inside_the_stem_are_not_options() -> Result<(), IngestError> {
        let text = "Q.7 The relation R(A, B, C) is in which normal form?\n\
            (A) 1NF (B) 2NF (C) 3NF (D) BCNF";
        let questions = parse_questions(text, 2019, "Set-1")?;

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "The relation R(A, B, C) is in which normal form?");
        assert_eq!(questions[0].options, vec!["(A) 1NF", "(B) 2NF", "(C) 3NF", "(D) BCNF"]);
        Ok(())
    }

    #[test]
    fn documents_take_year_and_set_from_their_file_name() -> Result<(), IngestError> {
        let document = PdfDocument {
            file_path: "/papers/gate_2022_set1.pdf".to_string(),
            file_name: "gate_2022_set1.pdf".to_string(),
            checksum: "checksum".to_string(),
            total_pages: 1,
            pages: vec![PageText::new(1, PAPER)],
            extracted_at: Utc::now(),
        };

        let questions = questions_from_document(&document)?;
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.year == 2022 && q.paper_set == "Set-1"));
        Ok(())
    }

    #[test]
    fn answer_letters_are_normalized() {
        assert_eq!(answer_letter("B"), Some('B'));
        assert_eq!(answer_letter("(c) Deadlock"), Some('C'));
        assert_eq!(answer_letter(" d) "), Some('D'));
        assert_eq!(answer_letter("Because"), None);
        assert_eq!(answer_letter(""), None);
    }

    #[test]
    fn filenames_yield_year_and_set() -> Result<(), IngestError> {
        assert_eq!(extract_year_from_filename("gate_2021_set2.pdf")?, 2021);
        assert_eq!(extract_year_from_filename("notes.pdf")?, 0);
        assert_eq!(extract_set_from_filename("gate_2021_set2.pdf")?, "Set-2");
        assert_eq!(extract_set_from_filename("GATE-SET A.pdf")?, "Set-A");
        assert_eq!(extract_set_from_filename("gate.pdf")?, "Unknown");
        Ok(())
    }

    #[test]
    fn clean_text_strips_symbols() -> Result<(), IngestError> {
        assert_eq!(clean_text("  O(n log n) ★ time\n\n")?, "O(n log n) time");
        Ok(())
    }
}
