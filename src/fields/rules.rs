//! Heuristic rule tables for field parsing.
//!
//! Dropdown extraction and type inference are both ordered lists of
//! (predicate, outcome) rules: the first rule whose predicate holds and
//! whose extractor produces something wins. New heuristics are added by
//! appending a rule, not by touching control flow.

use regex::Regex;
use std::sync::OnceLock;

use crate::db::FieldKind;

/// Phrases an operator writes in the description column to request a
/// dropdown widget. The first spelling is a long-lived typo that real
/// spreadsheets contain, so both are recognized.
const DROPDOWN_TRIGGERS: &[&str] = &["這遠可以做成下拉式選單", "這邊可以做成下拉式選單"];

/// Keyword marking a yes/no style field.
const YES_NO_KEYWORD: &str = "是否";

/// Description keywords hinting at a numeric amount.
const NUMERIC_UNIT_HINTS: &[&str] = &["金額", "元", "數量", "坪數", "年齡", "人數"];

/// Description keywords hinting at a phone number.
const PHONE_HINTS: &[&str] = &["電話", "手機", "傳真"];

/// Field-name keywords that force a plain text widget no matter what the
/// sample value looks like (identifiers, names, addresses, capacities).
const FORCE_TEXT_NAME_HINTS: &[&str] = &["姓名", "名稱", "身分證", "統一編號", "地址", "容量"];

fn numbered_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+\.|\d+\s").expect("valid numbered-list pattern"))
}

fn has_dropdown_trigger(description: &str) -> bool {
    DROPDOWN_TRIGGERS.iter().any(|t| description.contains(t))
}

fn strip_triggers(description: &str) -> String {
    let mut text = description.to_string();
    for trigger in DROPDOWN_TRIGGERS {
        text = text.replace(trigger, "");
    }
    text.trim().to_string()
}

struct OptionRule {
    #[allow(dead_code)]
    name: &'static str,
    applies: fn(&str) -> bool,
    extract: fn(&str) -> Option<Vec<String>>,
}

/// Tried in order; the first rule that applies and extracts wins.
const OPTION_RULES: &[OptionRule] = &[
    OptionRule {
        name: "newline-list",
        applies: has_dropdown_trigger,
        extract: newline_options,
    },
    OptionRule {
        name: "numbered-list",
        applies: has_dropdown_trigger,
        extract: numbered_options,
    },
    OptionRule {
        name: "yes-no",
        applies: |description| description.contains(YES_NO_KEYWORD),
        extract: yes_no_options,
    },
];

/// One option per non-empty line of the description with the trigger phrase
/// removed. Only useful when the operator actually wrote a multi-line list.
fn newline_options(description: &str) -> Option<Vec<String>> {
    let text = strip_triggers(description);
    let options: Vec<String> = text
        .split('\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if options.len() > 1 {
        Some(options)
    } else {
        None
    }
}

/// Fallback for one-line lists written as "1.紅色 2.藍色 3.綠色".
fn numbered_options(description: &str) -> Option<Vec<String>> {
    let text = strip_triggers(description);
    let options: Vec<String> = numbered_list_pattern()
        .split(&text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if options.is_empty() {
        None
    } else {
        Some(options)
    }
}

/// A 是否-style field: take an explicit two-way split when the description
/// names one, otherwise default to 是/否.
fn yes_no_options(description: &str) -> Option<Vec<String>> {
    let text = strip_triggers(description);
    let is_short = |s: &str| !s.is_empty() && s.chars().count() <= 4;

    // An explicit pair written as 有/無, 是|否 or 同意、不同意 inside a token.
    for token in text.split_whitespace() {
        for sep in ['/', '|', '、'] {
            if let Some((a, b)) = token.split_once(sep) {
                if is_short(a) && is_short(b) {
                    return Some(vec![a.to_string(), b.to_string()]);
                }
            }
        }
    }
    // A pair separated by spaces after the question text.
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() >= 3 {
        let (a, b) = (words[words.len() - 2], words[words.len() - 1]);
        if is_short(a) && is_short(b) && !a.contains(YES_NO_KEYWORD) && !b.contains(YES_NO_KEYWORD)
        {
            return Some(vec![a.to_string(), b.to_string()]);
        }
    }
    Some(vec!["是".to_string(), "否".to_string()])
}

/// Extract dropdown options from a field's description column. Options keep
/// encounter order and duplicates; an empty result means "free text input".
pub fn extract_dropdown_options(description: &str) -> Vec<String> {
    for rule in OPTION_RULES {
        if (rule.applies)(description) {
            if let Some(options) = (rule.extract)(description) {
                return options;
            }
        }
    }
    Vec::new()
}

/// Everything the type-inference rules may look at.
pub struct FieldFacts<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub description: &'a str,
}

struct TypeRule {
    #[allow(dead_code)]
    name: &'static str,
    infer: fn(&FieldFacts) -> Option<FieldKind>,
}

/// Tried in order; identity-like names win over value-shape rules.
const TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        name: "identity-forces-text",
        infer: |facts| {
            FORCE_TEXT_NAME_HINTS
                .iter()
                .any(|hint| facts.name.contains(hint))
                .then_some(FieldKind::Text)
        },
    },
    TypeRule {
        name: "phone",
        infer: |facts| {
            let digits = facts.value.chars().filter(char::is_ascii_digit).count();
            (PHONE_HINTS.iter().any(|h| facts.description.contains(h)) && digits >= 8)
                .then_some(FieldKind::Phone)
        },
    },
    TypeRule {
        name: "email",
        infer: |facts| facts.value.contains('@').then_some(FieldKind::Email),
    },
    TypeRule {
        name: "date",
        infer: |facts| {
            (!facts.value.is_empty()
                && facts.value.chars().any(|c| matches!(c, '/' | '-' | '年')))
            .then_some(FieldKind::Date)
        },
    },
    TypeRule {
        name: "number",
        infer: |facts| {
            let numeric_value = !facts.value.is_empty()
                && facts.value.chars().all(|c| c.is_ascii_digit() || c == '.')
                && facts.value.chars().any(|c| c.is_ascii_digit());
            (NUMERIC_UNIT_HINTS
                .iter()
                .any(|h| facts.description.contains(h))
                && numeric_value)
                .then_some(FieldKind::Number)
        },
    },
];

/// Best-effort widget hint for one parsed row. Defaults to plain text.
pub fn infer_field_kind(facts: &FieldFacts) -> FieldKind {
    for rule in TYPE_RULES {
        if let Some(kind) = (rule.infer)(facts) {
            return kind;
        }
    }
    FieldKind::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_separated_options() {
        let description = "這邊可以做成下拉式選單\n選項一\n選項二";
        assert_eq!(extract_dropdown_options(description), vec!["選項一", "選項二"]);
    }

    #[test]
    fn numbered_options_without_newlines() {
        let description = "這邊可以做成下拉式選單 1.紅色 2.藍色 3.綠色";
        assert_eq!(
            extract_dropdown_options(description),
            vec!["紅色", "藍色", "綠色"]
        );
    }

    #[test]
    fn typo_trigger_spelling_is_recognized() {
        let description = "這遠可以做成下拉式選單\n甲\n乙";
        assert_eq!(extract_dropdown_options(description), vec!["甲", "乙"]);
    }

    #[test]
    fn single_line_remainder_becomes_one_option() {
        // No newline list and no numbered pattern: the cleaned remainder
        // survives as a single option, matching the original behavior.
        let description = "這邊可以做成下拉式選單自用住宅";
        assert_eq!(extract_dropdown_options(description), vec!["自用住宅"]);
    }

    #[test]
    fn duplicates_are_kept_in_encounter_order() {
        let description = "這邊可以做成下拉式選單\n甲\n乙\n甲";
        assert_eq!(extract_dropdown_options(description), vec!["甲", "乙", "甲"]);
    }

    #[test]
    fn yes_no_with_explicit_separator() {
        assert_eq!(
            extract_dropdown_options("是否同意 同意/不同意"),
            vec!["同意", "不同意"]
        );
        assert_eq!(extract_dropdown_options("是否加保 有/無"), vec!["有", "無"]);
        assert_eq!(extract_dropdown_options("是否出席 出席 缺席"), vec!["出席", "缺席"]);
    }

    #[test]
    fn yes_no_defaults_without_separator() {
        assert_eq!(extract_dropdown_options("是否為自用住宅用地"), vec!["是", "否"]);
    }

    #[test]
    fn plain_description_yields_no_options() {
        assert!(extract_dropdown_options("請填寫承租人全名").is_empty());
    }

    #[test]
    fn identity_name_forces_text_even_for_digit_value() {
        let facts = FieldFacts {
            name: "身分證字號",
            value: "12345678",
            description: "證件號碼",
        };
        assert_eq!(infer_field_kind(&facts), FieldKind::Text);
    }

    #[test]
    fn phone_needs_keyword_and_eight_digits() {
        let phone = FieldFacts {
            name: "聯絡方式",
            value: "0912345678",
            description: "聯絡電話",
        };
        assert_eq!(infer_field_kind(&phone), FieldKind::Phone);

        let too_short = FieldFacts {
            name: "聯絡方式",
            value: "12345",
            description: "聯絡電話",
        };
        assert_eq!(infer_field_kind(&too_short), FieldKind::Text);
    }

    #[test]
    fn email_date_and_number_rules() {
        let email = FieldFacts {
            name: "信箱",
            value: "someone@example.com",
            description: "",
        };
        assert_eq!(infer_field_kind(&email), FieldKind::Email);

        let date = FieldFacts {
            name: "起租日",
            value: "2024-01-01",
            description: "",
        };
        assert_eq!(infer_field_kind(&date), FieldKind::Date);

        let number = FieldFacts {
            name: "租金",
            value: "15000",
            description: "每月金額（元）",
        };
        assert_eq!(infer_field_kind(&number), FieldKind::Number);

        let plain = FieldFacts {
            name: "備註",
            value: "無",
            description: "",
        };
        assert_eq!(infer_field_kind(&plain), FieldKind::Text);
    }
}
