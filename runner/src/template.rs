//! Configuration templates with typed placeholders.
//!
//! A placeholder is written as `@NAME@` where `NAME` consists of upper case
//! ASCII letters, digits and underscores. Any other use of `@` is literal text.
//! `START_TIME` is the only recognized name; templates naming anything else, or
//! not containing a placeholder at all, are rejected so a substitution can
//! never silently do nothing.

use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

const DELIMITER: char = '@';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unrecognized placeholder @{name}@ on line {line}")]
    UnknownPlaceholder { name: String, line: usize },
    #[error("Template does not contain any placeholder")]
    NoPlaceholder,
    #[error("No value given for placeholder {0}")]
    MissingValue(Placeholder),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    StartTime,
}

impl Placeholder {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartTime => "START_TIME",
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DELIMITER}{}{DELIMITER}", self.name())
    }
}

impl FromStr for Placeholder {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "START_TIME" => Ok(Self::StartTime),
            _ => Err(()),
        }
    }
}

pub type Substitutions = BTreeMap<Placeholder, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Placeholder),
}

/// A parsed template, split into literal text and placeholder slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn is_placeholder_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = source;
        let mut line = 1;

        while let Some(start) = rest.find(DELIMITER) {
            let (before, after) = rest.split_at(start);
            let after = &after[DELIMITER.len_utf8()..];
            text.push_str(before);
            line += before.matches('\n').count();

            match after
                .find(DELIMITER)
                .map(|end| (&after[..end], &after[end + DELIMITER.len_utf8()..]))
                .filter(|(candidate, _)| is_placeholder_name(candidate))
            {
                Some((name, remainder)) => {
                    let placeholder = name.parse::<Placeholder>().map_err(|_| {
                        TemplateError::UnknownPlaceholder {
                            name: name.to_string(),
                            line,
                        }
                    })?;

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(placeholder));
                    rest = remainder;
                }
                None => {
                    text.push(DELIMITER);
                    rest = after;
                }
            }
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        if !segments
            .iter()
            .any(|segment| matches!(segment, Segment::Slot(_)))
        {
            return Err(TemplateError::NoPlaceholder);
        }

        Ok(Self { segments })
    }

    pub fn render(&self, values: &Substitutions) -> Result<String, TemplateError> {
        self.segments
            .iter()
            .try_fold(String::new(), |mut output, segment| {
                match segment {
                    Segment::Text(text) => output.push_str(text),
                    Segment::Slot(placeholder) => output.push_str(
                        values
                            .get(placeholder)
                            .ok_or(TemplateError::MissingValue(*placeholder))?,
                    ),
                }

                Ok(output)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_time(value: &str) -> Substitutions {
        Substitutions::from([(Placeholder::StartTime, value.to_string())])
    }

    #[test]
    fn replaces_every_occurrence() {
        let template =
            Template::parse("[default]\nstart_time = @START_TIME@\nid = run.@START_TIME@\n")
                .unwrap();

        assert_eq!(
            template.render(&start_time("2009-04-06T01:00:00")).unwrap(),
            "[default]\nstart_time = 2009-04-06T01:00:00\nid = run.2009-04-06T01:00:00\n"
        );
    }

    #[test]
    fn keeps_literal_delimiters() {
        let template =
            Template::parse("mail = user@example.org\nt = @START_TIME@ @ 50% @lower@").unwrap();

        assert_eq!(
            template.render(&start_time("X")).unwrap(),
            "mail = user@example.org\nt = X @ 50% @lower@"
        );
    }

    #[test]
    fn keeps_format_braces() {
        let template =
            Template::parse("pattern = scm_in.{time:%Y%m%d}.nc\nstart = @START_TIME@").unwrap();

        assert_eq!(
            template.render(&start_time("T")).unwrap(),
            "pattern = scm_in.{time:%Y%m%d}.nc\nstart = T"
        );
    }

    #[test]
    fn rejects_unknown_placeholders() {
        assert_eq!(
            Template::parse("a = @START_TIME@\nb = @END_TIME@\n"),
            Err(TemplateError::UnknownPlaceholder {
                name: "END_TIME".to_string(),
                line: 2
            })
        );
    }

    #[test]
    fn rejects_templates_without_placeholder() {
        assert_eq!(
            Template::parse("start_time = 2009-04-06\n"),
            Err(TemplateError::NoPlaceholder)
        );
    }

    #[test]
    fn missing_value() {
        let template = Template::parse("@START_TIME@").unwrap();

        assert_eq!(
            template.render(&Substitutions::new()),
            Err(TemplateError::MissingValue(Placeholder::StartTime))
        );
    }
}
