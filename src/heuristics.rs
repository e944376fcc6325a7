//! Deterministic heuristic classification strategy.
//!
//! Used as the fallback when the chat backend is unavailable or returns
//! output that cannot be parsed, and as the only strategy when no backend is
//! configured. Total: any input text produces a well-formed result.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ActionKind, Category, ClassificationResult, Deadline, SenderRole, TaskType};

/// Whole-text summaries are capped at this many characters.
pub const SUMMARY_LIMIT: usize = 180;
/// Per-deadline sentence descriptions are capped at this many characters.
const SENTENCE_LIMIT: usize = 160;

static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

// D[./-]M[./-][YY|YYYY]? with a unified separator set; ranges are validated
// after the match.
static NUMERIC_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[./-](\d{1,2})(?:[./-](\d{4}|\d{2}))?\b").unwrap());

// "20 мая 2024", "3 сент", year optional.
static MONTH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?iu)\b(\d{1,2})\s+([а-яё]+)\.?(?:\s+(\d{4}))?").unwrap());

const DEADLINE_KEYWORDS: &[&str] = &["дедлайн", "срок", "сдать", "сдача", "due", "submit"];
const ANNOUNCEMENT_KEYWORDS: &[&str] = &[
    "объявление",
    "внимание",
    "важно",
    "announcement",
    "attention",
];
const URGENCY_KEYWORDS: &[&str] = &["срочн", "немедленно", "критично", "urgent", "asap"];

// Longest phrases first so "послезавтра" wins over "завтра".
const RELATIVE_PHRASES: &[&str] = &[
    "послезавтра",
    "на следующей неделе",
    "в следующий понедельник",
    "в следующий вторник",
    "в следующую среду",
    "в следующий четверг",
    "в следующую пятницу",
    "в следующую субботу",
    "в следующее воскресенье",
    "завтра",
    "сегодня",
    "day after tomorrow",
    "next monday",
    "next tuesday",
    "next wednesday",
    "next thursday",
    "next friday",
    "next saturday",
    "next sunday",
    "next week",
    "tomorrow",
    "today",
];

/// Classify a message without a language model.
///
/// Never fails: empty or whitespace-only text yields a sentinel result with
/// category `other` and score 0.
pub fn classify(text: &str, sender_role: SenderRole) -> ClassificationResult {
    if text.trim().is_empty() {
        return ClassificationResult {
            category: Category::Other,
            importance_score: 0,
            task_title: None,
            task_type: TaskType::OneTime,
            action: ActionKind::Info,
            summary: "Пустое сообщение".to_string(),
            extracted_links: Vec::new(),
            extracted_deadlines: Vec::new(),
        };
    }

    let lower = text.to_lowercase();
    let links = extract_links(text);
    let deadlines = extract_deadlines(text, &lower);

    let category = if !deadlines.is_empty() {
        Category::Deadline
    } else if !links.is_empty() {
        Category::Link
    } else if sender_role == SenderRole::Teacher || contains_any(&lower, ANNOUNCEMENT_KEYWORDS) {
        Category::Announcement
    } else {
        Category::Other
    };

    let mut score: i64 = match category {
        Category::Deadline => 8,
        Category::Announcement => 6,
        Category::Link => 5,
        Category::Other => 2,
    };
    if contains_any(&lower, URGENCY_KEYWORDS) {
        score = (score + 2).min(10);
    }
    if sender_role == SenderRole::Teacher && category != Category::Deadline {
        score = (score + 1).min(10);
    }

    ClassificationResult {
        category,
        importance_score: score,
        task_title: None,
        task_type: TaskType::OneTime,
        action: ActionKind::Info,
        summary: summarize(text),
        extracted_links: links,
        extracted_deadlines: deadlines,
    }
}

/// Whitespace-collapsed text truncated to [`SUMMARY_LIMIT`] characters.
pub fn summarize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, SUMMARY_LIMIT)
}

/// Extract `http(s)` links, excluding trailing punctuation, deduplicated in
/// first-seen order.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut links = Vec::new();
    for m in LINK_RE.find_iter(text) {
        let url = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '"', '\'', '»']);
        if url.is_empty() {
            continue;
        }
        if !links.iter().any(|l| l == url) {
            links.push(url.to_string());
        }
    }
    links
}

/// Extract deadlines in priority order: numeric dates, Russian month-name
/// dates, a relative-date phrase, then a keyword-only fallback.
///
/// `lower` must be the lowercased form of `text`.
pub fn extract_deadlines(text: &str, lower: &str) -> Vec<Deadline> {
    let mut out: Vec<Deadline> = Vec::new();

    for caps in NUMERIC_DATE_RE.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            continue;
        }
        let mut date = format!("{:02}.{:02}", day, month);
        if let Some(year) = caps.get(3) {
            let y = year.as_str();
            if y.len() == 2 {
                date.push_str(&format!(".20{}", y));
            } else {
                date.push_str(&format!(".{}", y));
            }
        }
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        push_unique(&mut out, date, sentence_around(text, whole.0, whole.1));
    }

    for caps in MONTH_DATE_RE.captures_iter(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let Some(month) = month_number(&caps[2].to_lowercase()) else {
            continue;
        };
        if !(1..=31).contains(&day) {
            continue;
        }
        let mut date = format!("{:02}.{:02}", day, month);
        if let Some(year) = caps.get(3) {
            date.push_str(&format!(".{}", year.as_str()));
        }
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        push_unique(&mut out, date, sentence_around(text, whole.0, whole.1));
    }

    if out.is_empty() {
        if let Some(pos) = find_relative_phrase(lower) {
            let (phrase, start) = pos;
            let date = format!("relative: {}", phrase);
            // The phrase position in `lower` maps onto `text` only for the
            // sentence boundary scan, which looks at ASCII separators.
            let end = start + phrase.len();
            push_unique(&mut out, date, sentence_around(text, start, end.min(text.len())));
        }
    }

    if out.is_empty() && contains_any(lower, DEADLINE_KEYWORDS) {
        out.push(Deadline {
            date: "relative: скоро".to_string(),
            description: summarize(text),
        });
    }

    out
}

fn push_unique(out: &mut Vec<Deadline>, date: String, description: String) {
    if !out
        .iter()
        .any(|d| d.date == date && d.description == description)
    {
        out.push(Deadline { date, description });
    }
}

fn find_relative_phrase(lower: &str) -> Option<(&'static str, usize)> {
    for phrase in RELATIVE_PHRASES {
        if let Some(start) = lower.find(phrase) {
            return Some((phrase, start));
        }
    }
    None
}

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}

fn month_number(token: &str) -> Option<u32> {
    let n = match token {
        "января" | "январь" | "янв" => 1,
        "февраля" | "февраль" | "фев" => 2,
        "марта" | "март" | "мар" => 3,
        "апреля" | "апрель" | "апр" => 4,
        "мая" | "май" => 5,
        "июня" | "июнь" | "июн" => 6,
        "июля" | "июль" | "июл" => 7,
        "августа" | "август" | "авг" => 8,
        "сентября" | "сентябрь" | "сент" | "сен" => 9,
        "октября" | "октябрь" | "окт" => 10,
        "ноября" | "ноябрь" | "ноя" => 11,
        "декабря" | "декабрь" | "дек" => 12,
        _ => return None,
    };
    Some(n)
}

/// The enclosing sentence of a matched span: text between the nearest
/// preceding `.`/newline and the nearest following `.`/newline, truncated.
/// Falls back to the whole-text summary when the sentence is empty.
fn sentence_around(text: &str, start: usize, end: usize) -> String {
    let bytes = text.as_bytes();
    let begin = bytes[..start.min(bytes.len())]
        .iter()
        .rposition(|&b| b == b'.' || b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let stop = bytes[end.min(bytes.len())..]
        .iter()
        .position(|&b| b == b'.' || b == b'\n')
        .map(|i| end + i)
        .unwrap_or(bytes.len());

    let sentence = text[begin..stop].trim();
    if sentence.is_empty() {
        summarize(text)
    } else {
        truncate_chars(sentence, SENTENCE_LIMIT)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> ClassificationResult {
        classify(text, SenderRole::Unknown)
    }

    #[test]
    fn test_numeric_date_and_link() {
        let result = run("Сдать лабораторную до 20.05.2024, подробности: https://example.com/lab");
        assert_eq!(result.category, Category::Deadline);
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "20.05.2024");
        assert_eq!(result.extracted_links, vec!["https://example.com/lab"]);
        assert_eq!(result.importance_score, 8);
    }

    #[test]
    fn test_relative_tomorrow() {
        let result = run("Встреча завтра в 10");
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "relative: завтра");
        assert_eq!(
            result.extracted_deadlines[0].description,
            "Встреча завтра в 10"
        );
    }

    #[test]
    fn test_day_after_tomorrow_beats_tomorrow() {
        let result = run("Экзамен послезавтра");
        assert_eq!(result.extracted_deadlines[0].date, "relative: послезавтра");
    }

    #[test]
    fn test_next_weekday_english() {
        let result = run("Встреча next friday в 10");
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "relative: next friday");
    }

    #[test]
    fn test_next_weekday_beats_keyword_fallback() {
        // "submit" is a deadline keyword; the relative phrase must win
        let result = run("Please submit the lab report by next Friday");
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "relative: next friday");
    }

    #[test]
    fn test_month_name_date() {
        let result = run("Экзамен состоится 20 мая 2024 в аудитории 404");
        assert_eq!(result.extracted_deadlines[0].date, "20.05.2024");
    }

    #[test]
    fn test_month_name_without_year() {
        let result = run("Контрольная 3 сентября, не опаздывать");
        assert_eq!(result.extracted_deadlines[0].date, "03.09");
    }

    #[test]
    fn test_two_digit_year_expanded() {
        let result = run("Отчёт до 01.06.24");
        assert_eq!(result.extracted_deadlines[0].date, "01.06.2024");
    }

    #[test]
    fn test_keyword_only_fallback() {
        let result = run("Не забудьте про дедлайн по курсовой");
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "relative: скоро");
        assert_eq!(
            result.extracted_deadlines[0].description,
            "Не забудьте про дедлайн по курсовой"
        );
    }

    #[test]
    fn test_no_date_no_keyword_yields_no_deadline() {
        let result = run("Лекция была интересная");
        assert!(result.extracted_deadlines.is_empty());
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.importance_score, 2);
    }

    #[test]
    fn test_empty_text_sentinel() {
        let result = run("");
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.importance_score, 0);

        let result = run("   \n\t ");
        assert_eq!(result.category, Category::Other);
        assert_eq!(result.importance_score, 0);
    }

    #[test]
    fn test_arbitrary_unicode_is_total() {
        let result = run("𝔘𝔫𝔦𝔠𝔬𝔡𝔢 ☃ здесь 🎓 nothing special");
        assert_eq!(result.category, Category::Other);
        assert!(result.importance_score >= 0 && result.importance_score <= 10);
    }

    #[test]
    fn test_link_trailing_punctuation_stripped() {
        let links = extract_links("см. (https://example.com/page), и https://example.com/page.");
        assert_eq!(links, vec!["https://example.com/page"]);
    }

    #[test]
    fn test_link_category_and_score() {
        let result = run("Материалы лекции: https://example.com/slides");
        assert_eq!(result.category, Category::Link);
        assert_eq!(result.importance_score, 5);
    }

    #[test]
    fn test_teacher_announcement() {
        let result = classify("Завтра лекции не будет", SenderRole::Teacher);
        // "завтра" is a relative date, so deadline wins over announcement
        assert_eq!(result.category, Category::Deadline);
        // no teacher bonus for the deadline category
        assert_eq!(result.importance_score, 8);

        let result = classify("Лекция переносится в аудиторию 505", SenderRole::Teacher);
        assert_eq!(result.category, Category::Announcement);
        assert_eq!(result.importance_score, 7); // 6 + teacher bonus
    }

    #[test]
    fn test_urgency_bonus_capped() {
        let result = run("Срочно! Сдать отчёт до 20.05.2024");
        assert_eq!(result.category, Category::Deadline);
        assert_eq!(result.importance_score, 10); // 8 + 2, capped
    }

    #[test]
    fn test_announcement_keyword_without_teacher() {
        let result = run("Внимание: расписание изменилось");
        assert_eq!(result.category, Category::Announcement);
        assert_eq!(result.importance_score, 6);
    }

    #[test]
    fn test_summary_truncated() {
        let long = "слово ".repeat(100);
        let result = run(&long);
        assert!(result.summary.chars().count() <= SUMMARY_LIMIT + 1);
        assert!(result.summary.ends_with('…'));
    }

    #[test]
    fn test_duplicate_dates_deduped() {
        let result = run("Сдать до 20.05.2024. Повторяю: сдать до 20.05.2024.");
        // same date, different sentences — both survive the (date, description) key
        assert!(result.extracted_deadlines.len() <= 2);
        let result = run("Сдать до 20-05-2024 или до 20-05-2024");
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "20.05.2024");
    }

    #[test]
    fn test_sentence_description_bounded() {
        let text = format!("{} до 20.05.2024 {}", "а".repeat(200), "б".repeat(200));
        let result = run(&text);
        let desc = &result.extracted_deadlines[0].description;
        assert!(desc.chars().count() <= 161);
        assert!(desc.ends_with('…'));
    }
}
