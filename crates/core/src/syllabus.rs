use crate::error::IngestError;
use crate::extractor::extract_document;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SubjectEntry {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

/// Subjects keyed by name, each with its topics, in the order they were written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Syllabus {
    pub subjects: IndexMap<String, SubjectEntry>,
}

fn default_difficulty() -> u8 {
    1
}

impl Syllabus {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn topic_count(&self) -> usize {
        self.subjects.values().map(|subject| subject.topics.len()).sum()
    }

    /// `(subject, topic)` pairs in subject order.
    pub fn topics(&self) -> impl Iterator<Item = (&str, &TopicEntry)> {
        self.subjects.iter().flat_map(|(subject, entry)| {
            entry.topics.iter().map(move |topic| (subject.as_str(), topic))
        })
    }

    pub fn default_gate_cs() -> Self {
        let mut subjects = IndexMap::new();
        subjects.insert(
            "Operating Systems".to_string(),
            subject(
                "Fundamentals of operating systems",
                &[
                    ("Process Management", "Process scheduling and synchronization", 2),
                    ("Memory Management", "Virtual memory and paging", 3),
                    ("File Systems", "File organization and access", 2),
                    ("Deadlocks", "Deadlock handling strategies", 3),
                ],
            ),
        );
        subjects.insert(
            "Database Management Systems".to_string(),
            subject(
                "Database design and implementation",
                &[
                    ("ER Model", "Entity-Relationship modeling", 1),
                    ("Relational Model", "Relational algebra and calculus", 2),
                    ("Normalization", "Normal forms and decomposition", 3),
                    ("SQL", "SQL queries and operations", 2),
                    ("Transactions", "ACID properties and concurrency", 3),
                ],
            ),
        );
        subjects.insert(
            "Algorithms".to_string(),
            subject(
                "Design and analysis of algorithms",
                &[
                    ("Sorting", "Various sorting algorithms", 2),
                    ("Searching", "Search algorithms", 1),
                    ("Dynamic Programming", "DP techniques", 4),
                    ("Greedy Algorithms", "Greedy approach", 3),
                    ("Graph Algorithms", "Graph traversal and shortest paths", 3),
                ],
            ),
        );
        Self { subjects }
    }
}

fn subject(description: &str, topics: &[(&str, &str, u8)]) -> SubjectEntry {
    SubjectEntry {
        description: description.to_string(),
        topics: topics
            .iter()
            .map(|(name, description, difficulty)| TopicEntry {
                name: name.to_string(),
                description: description.to_string(),
                difficulty: *difficulty,
            })
            .collect(),
    }
}

pub fn extract_syllabus_structure(path: &Path) -> Result<Syllabus, IngestError> {
    let document = extract_document(path)?;
    Ok(parse_syllabus_text(&document.full_text()))
}

/// Upper-case lines and short title-case lines open a subject; the lines
/// that follow are its topics. Bulleted lines are always topics.
pub fn parse_syllabus_text(text: &str) -> Syllabus {
    let mut syllabus = Syllabus::default();
    let mut current: Option<String> = None;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let bulleted = line.starts_with(is_bullet);
        let is_heading = !bulleted
            && (is_upper(line) || (is_title(line) && line.split_whitespace().count() <= 5));

        if is_heading {
            syllabus
                .subjects
                .insert(line.to_string(), SubjectEntry::default());
            current = Some(line.to_string());
            continue;
        }

        let Some(subject) = current.as_ref() else {
            continue;
        };
        let name = line.trim_matches(is_bullet).trim();
        if name.chars().count() > 3 {
            if let Some(entry) = syllabus.subjects.get_mut(subject) {
                entry.topics.push(TopicEntry {
                    name: name.to_string(),
                    description: String::new(),
                    difficulty: 2,
                });
            }
        }
    }

    syllabus
}

fn is_bullet(c: char) -> bool {
    matches!(c, '•' | '-' | '–' | '—' | '*')
}

fn is_upper(line: &str) -> bool {
    let mut cased = false;
    for c in line.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            cased = true;
        }
    }
    cased
}

/// Every cased run starts with one upper-case letter followed by lower-case ones.
fn is_title(line: &str) -> bool {
    let mut cased = false;
    let mut previous_cased = false;
    for c in line.chars() {
        if c.is_uppercase() {
            if previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else if c.is_lowercase() {
            if !previous_cased {
                return false;
            }
            previous_cased = true;
            cased = true;
        } else {
            previous_cased = false;
        }
    }
    cased
}
