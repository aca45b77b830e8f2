use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::filing::DocumentFields;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    pub role: String,
    pub entity_type: String,
    pub entity_name: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"[\w.\-+]+@[\w.\-]+").expect("email pattern"))
}

pub fn extract_phone(lines: &[&str]) -> Option<String> {
    let mut phone = None;

    for (i, line) in lines.iter().enumerate() {
        let Some(after) = line.strip_prefix("Phone:") else {
            continue;
        };
        let after = after.trim();
        if !after.is_empty() {
            phone = Some(after.to_string());
            continue;
        }

        // Blank on its own line; the value may wrap onto one of the next lines.
        if let Some(candidate) = lines
            .iter()
            .skip(i + 1)
            .take(3)
            .filter(|c| !c.is_empty() && !c.starts_with("Email:"))
            .find(|c| c.chars().any(|ch| ch.is_ascii_digit()))
        {
            phone = Some(candidate.to_string());
        }
    }

    phone
}

pub fn extract_email(lines: &[&str], full_text: &str) -> Option<String> {
    let mut email = None;

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with("Email:") {
            continue;
        }
        if let Some(found) = lines
            .iter()
            .skip(i)
            .take(6)
            .filter(|c| c.contains('@'))
            .find_map(|c| email_regex().find(c))
        {
            email = Some(found.as_str().to_string());
        }
    }

    email.or_else(|| {
        email_regex()
            .find(full_text)
            .map(|m| m.as_str().to_string())
    })
}

/// Lines shaped like `EXECUTOR <TYPE> <FIRST> <LAST...>`, with the address taken
/// from up to three preceding lines.
pub fn extract_executors(lines: &[&str]) -> Vec<Executor> {
    let mut executors = vec![];

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with("EXECUTOR ") {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [role, entity_type, first_name, rest @ ..] = tokens.as_slice() else {
            continue;
        };
        let last_name = rest.join(" ");
        let entity_name = if last_name.is_empty() {
            first_name.to_string()
        } else {
            format!("{} {}", first_name, last_name)
        };

        let mut address_lines: Vec<&str> = vec![];
        for prev in lines[i.saturating_sub(3)..i].iter().rev() {
            if prev.is_empty() {
                continue;
            }
            if prev.starts_with("EXECUTOR ") {
                break;
            }
            address_lines.insert(0, prev);
            // Short all-caps lines ("UNITED STATES") close the address block.
            if prev.chars().any(|c| c.is_alphabetic())
                && *prev == prev.to_uppercase()
                && prev.split_whitespace().count() <= 3
            {
                break;
            }
        }

        executors.push(Executor {
            role: role.to_string(),
            entity_type: entity_type.to_string(),
            entity_name,
            first_name: first_name.to_string(),
            last_name,
            address: (!address_lines.is_empty()).then(|| address_lines.join(", ")),
        });
    }

    executors
}

pub fn extract_document_fields(page_texts: &[String]) -> DocumentFields {
    let full_text = page_texts.join("\n");
    let lines: Vec<&str> = full_text.lines().map(str::trim).collect();

    DocumentFields {
        phone: extract_phone(&lines),
        email: extract_email(&lines, &full_text),
        executors: extract_executors(&lines),
    }
}
