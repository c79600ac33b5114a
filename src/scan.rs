//! Section scanner for PWF text.
//!
//! PWF cases are a sequence of named sections (`DBAR`, `DLIN`, ...) each
//! closed by a `99999` row. The scanner is a small state machine over lines:
//! [`step`] maps the current [`Section`] and one raw line to the next section
//! and what to do with the line, and [`Scanner`] folds that over the input,
//! yielding only the data records the builders care about.

use log::trace;

use crate::config::ImportConfig;

pub const BUS_KEYWORD: &str = "DBAR";
pub const BRANCH_KEYWORD: &str = "DLIN";
pub const GENERATOR_KEYWORD: &str = "DGER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    None,
    Bus,
    Branch,
    Generator,
    Ignore,
}

/// What the scanner does with one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Section header or terminator, consumed.
    Consume,
    /// Comment, short line, or outside any data section.
    Skip,
    /// Data line for the current section.
    Forward,
    /// Terminator of the branch section; nothing after it is read.
    Stop,
}

/// Transition for one raw line (line terminator already removed).
pub fn step(section: Section, raw: &str, config: &ImportConfig) -> (Section, Action) {
    let clean = raw.trim().to_uppercase();

    if let Some(next) = section_keyword(&clean, config) {
        return (next, Action::Consume);
    }

    if clean.starts_with(config.sentinel.as_str()) {
        if section == Section::Branch {
            return (Section::None, Action::Stop);
        }
        return (Section::None, Action::Consume);
    }

    // the width counts the line terminator
    if raw.starts_with(config.comment_marker) || raw.chars().count() + 1 < config.min_record_width {
        return (section, Action::Skip);
    }

    match section {
        Section::Bus | Section::Branch | Section::Generator => (section, Action::Forward),
        Section::None | Section::Ignore => (section, Action::Skip),
    }
}

fn section_keyword(clean: &str, config: &ImportConfig) -> Option<Section> {
    if clean.starts_with(BUS_KEYWORD) {
        Some(Section::Bus)
    } else if clean.starts_with(BRANCH_KEYWORD) {
        Some(Section::Branch)
    } else if clean.starts_with(GENERATOR_KEYWORD) {
        Some(Section::Generator)
    } else if config
        .ignored_sections
        .iter()
        .any(|k| !k.is_empty() && clean.starts_with(k.to_uppercase().as_str()))
    {
        Some(Section::Ignore)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Bus,
    Branch,
    Generator,
}

/// A data line tagged with the section it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// 1-based line number in the input.
    pub line: usize,
    pub kind: RecordKind,
    pub text: &'a str,
}

/// Iterator over the data records of a PWF text.
pub struct Scanner<'a, 'c> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    section: Section,
    stopped: bool,
    config: &'c ImportConfig,
}

impl<'a, 'c> Scanner<'a, 'c> {
    pub fn new(text: &'a str, config: &'c ImportConfig) -> Self {
        Self {
            lines: text.lines().enumerate(),
            section: Section::None,
            stopped: false,
            config,
        }
    }
}

impl<'a, 'c> Iterator for Scanner<'a, 'c> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        for (index, raw) in self.lines.by_ref() {
            let current = self.section;
            let (next, action) = step(current, raw, self.config);
            self.section = next;
            match action {
                Action::Forward => {
                    let kind = match current {
                        Section::Bus => RecordKind::Bus,
                        Section::Branch => RecordKind::Branch,
                        _ => RecordKind::Generator,
                    };
                    return Some(Record {
                        line: index + 1,
                        kind,
                        text: raw,
                    });
                }
                Action::Stop => {
                    trace!("line {}: end of branch data, scan finished", index + 1);
                    self.stopped = true;
                    return None;
                }
                Action::Consume => {
                    trace!("line {}: section {:?} -> {:?}", index + 1, current, next);
                }
                Action::Skip => {
                    trace!("line {}: skipped in section {:?}", index + 1, current);
                }
            }
        }
        None
    }
}
