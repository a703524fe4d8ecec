use super::{AppliedLine, GradeError, PartFile, PointLine, RubricItem, StudentGradeEntry};

const RUBRIC_HEADING: &str = "# Rubric";
const GRADES_HEADING: &str = "# Grades";

/// One trimmed line of a part file, classified before any block-level
/// interpretation happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    /// `## <anything>`; a rubric item name or a student header.
    Heading(&'a str),
    Point(PointLine),
    Grader(&'a str),
    /// Anything else. Inside an entry this is a candidate rubric reference.
    Text(&'a str),
}

pub fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return Line::Heading(rest.trim());
    }
    if let Some(grader) = parse_grader(line) {
        return Line::Grader(grader);
    }
    if let Some(point) = parse_point_line(line) {
        return Line::Point(point);
    }
    Line::Text(line)
}

/// `**+N** description` or `**-N** description`.
pub fn parse_point_line(line: &str) -> Option<PointLine> {
    let rest = line.strip_prefix("**")?;
    let sign_len = rest.chars().next().filter(|c| *c == '+' || *c == '-')?.len_utf8();
    let digits_len = rest[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits_len == 0 {
        return None;
    }
    let number_end = sign_len + digits_len;
    let description = rest[number_end..].strip_prefix("** ")?;
    let delta = rest[..number_end].parse::<i64>().ok()?;
    Some(PointLine {
        delta,
        description: description.trim().to_string(),
    })
}

/// ``**Grader:** `login` ``; an empty login still counts as a grader line.
fn parse_grader(line: &str) -> Option<&str> {
    let quoted = line.strip_prefix("**Grader:**")?.trim();
    let inner = quoted.strip_prefix('`')?.strip_suffix('`')?;
    if inner.contains('`') {
        return None;
    }
    Some(inner.trim())
}

/// ``[`id`](url)``
fn parse_student_header(heading: &str) -> Option<(&str, &str)> {
    let rest = heading.strip_prefix("[`")?;
    let (id, rest) = rest.split_once("`](")?;
    let url = rest.strip_suffix(')')?;
    if id.is_empty() || id.contains(char::is_whitespace) {
        return None;
    }
    Some((id, url))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPart {
    /// `None` when a structural error makes the file unusable.
    pub part: Option<PartFile>,
    pub errors: Vec<GradeError>,
}

/// Parses one hand-edited part file. Entries with problems are left out of
/// the result and every problem is reported in `errors`.
pub fn parse_part(name: &str, text: &str, staff: &[String]) -> ParsedPart {
    let lines = text.lines().collect::<Vec<_>>();
    let mut errors = Vec::new();

    let missing = |heading: &str| GradeError::MissingHeading {
        file: name.to_string(),
        heading: heading.to_string(),
    };

    let title_idx = lines.iter().position(|l| !l.trim().is_empty());
    let title = title_idx
        .map(|i| lines[i].trim())
        .and_then(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "Rubric" && *t != "Grades");
    let Some(title) = title else {
        errors.push(missing("# <title>"));
        return ParsedPart { part: None, errors };
    };
    let after_title = title_idx.map(|i| i + 1).unwrap_or(0);

    let Some(rubric_idx) = find_heading(&lines, after_title, RUBRIC_HEADING) else {
        errors.push(missing(RUBRIC_HEADING));
        return ParsedPart { part: None, errors };
    };
    let Some(grades_idx) = find_heading(&lines, rubric_idx + 1, GRADES_HEADING) else {
        errors.push(missing(GRADES_HEADING));
        return ParsedPart { part: None, errors };
    };

    let rubric = parse_rubric(name, &lines, rubric_idx + 1, grades_idx, &mut errors);
    let (entries, students) = parse_grades(name, &lines, grades_idx + 1, &rubric, staff, &mut errors);

    ParsedPart {
        part: Some(PartFile {
            name: name.to_string(),
            title: title.to_string(),
            rubric,
            entries,
            students,
        }),
        errors,
    }
}

fn find_heading(lines: &[&str], from: usize, heading: &str) -> Option<usize> {
    (from..lines.len()).find(|&i| lines[i].trim() == heading)
}

fn parse_rubric(
    file: &str,
    lines: &[&str],
    start: usize,
    end: usize,
    errors: &mut Vec<GradeError>,
) -> Vec<RubricItem> {
    let mut items: Vec<RubricItem> = Vec::new();
    // Lines after a duplicate heading belong to nothing.
    let mut current: Option<usize> = None;
    let mut in_duplicate = false;

    for (idx, raw) in lines.iter().enumerate().take(end).skip(start) {
        let line_no = idx + 1;
        match classify(raw) {
            Line::Blank => {}
            Line::Heading(identifier) => {
                if items.iter().any(|i| i.identifier == identifier) {
                    errors.push(GradeError::Duplicate {
                        file: file.to_string(),
                        line: line_no,
                        kind: "rubric item".to_string(),
                        identifier: identifier.to_string(),
                    });
                    in_duplicate = true;
                    current = None;
                } else {
                    items.push(RubricItem {
                        identifier: identifier.to_string(),
                        lines: Vec::new(),
                    });
                    in_duplicate = false;
                    current = Some(items.len() - 1);
                }
            }
            Line::Point(point) => match current {
                Some(i) => items[i].lines.push(point),
                None if in_duplicate => {}
                None => errors.push(GradeError::StrayLine {
                    file: file.to_string(),
                    line: line_no,
                    text: raw.trim().to_string(),
                    section: "rubric".to_string(),
                }),
            },
            Line::Grader(_) | Line::Text(_) => {
                if !in_duplicate {
                    errors.push(GradeError::MalformedPointLine {
                        file: file.to_string(),
                        line: line_no,
                        text: raw.trim().to_string(),
                    });
                }
            }
        }
    }
    items
}

struct RawEntry<'a> {
    header_line: usize,
    student: &'a str,
    url: &'a str,
    body: Vec<(usize, Line<'a>)>,
}

fn parse_grades(
    file: &str,
    lines: &[&str],
    start: usize,
    rubric: &[RubricItem],
    staff: &[String],
    errors: &mut Vec<GradeError>,
) -> (Vec<StudentGradeEntry>, Vec<String>) {
    let mut raw_entries: Vec<RawEntry> = Vec::new();
    // A malformed header swallows its body so it is reported only once.
    let mut skipping = false;

    for (idx, raw) in lines.iter().enumerate().skip(start) {
        let line_no = idx + 1;
        let line = classify(raw);
        match line {
            Line::Blank => {}
            Line::Heading(heading) => match parse_student_header(heading) {
                Some((student, url)) => {
                    raw_entries.push(RawEntry {
                        header_line: line_no,
                        student,
                        url,
                        body: Vec::new(),
                    });
                    skipping = false;
                }
                None => {
                    errors.push(GradeError::MalformedHeader {
                        file: file.to_string(),
                        line: line_no,
                        text: raw.trim().to_string(),
                    });
                    skipping = true;
                }
            },
            _ if skipping => {}
            other => match raw_entries.last_mut() {
                Some(entry) => entry.body.push((line_no, other)),
                None => errors.push(GradeError::StrayLine {
                    file: file.to_string(),
                    line: line_no,
                    text: raw.trim().to_string(),
                    section: "student".to_string(),
                }),
            },
        }
    }

    let mut entries: Vec<StudentGradeEntry> = Vec::new();
    let mut students: Vec<String> = Vec::new();
    for raw in raw_entries {
        if students.iter().any(|s| s == raw.student) {
            errors.push(GradeError::Duplicate {
                file: file.to_string(),
                line: raw.header_line,
                kind: "student".to_string(),
                identifier: raw.student.to_string(),
            });
            continue;
        }
        students.push(raw.student.to_string());
        if let Some(entry) = resolve_entry(file, raw, rubric, staff, errors) {
            entries.push(entry);
        }
    }
    (entries, students)
}

fn resolve_entry(
    file: &str,
    raw: RawEntry<'_>,
    rubric: &[RubricItem],
    staff: &[String],
    errors: &mut Vec<GradeError>,
) -> Option<StudentGradeEntry> {
    let student = raw.student.to_string();
    let mut body = raw.body;
    let grader = match body.pop() {
        Some((_, Line::Grader(grader))) => grader.to_string(),
        _ => {
            errors.push(GradeError::MissingGrader {
                file: file.to_string(),
                student,
            });
            return None;
        }
    };

    let error_count = errors.len();
    let mut applied = Vec::new();
    for (line_no, line) in body {
        match line {
            Line::Point(point) => applied.push(AppliedLine::Point(point)),
            Line::Text(text) => match rubric.iter().find(|r| r.identifier == text) {
                Some(item) => applied.push(AppliedLine::Rubric {
                    identifier: item.identifier.clone(),
                    lines: item.lines.clone(),
                }),
                None if text.starts_with("**") && !text.starts_with("**Grader") => {
                    errors.push(GradeError::MalformedPointLine {
                        file: file.to_string(),
                        line: line_no,
                        text: text.to_string(),
                    })
                }
                None => errors.push(GradeError::UnrecognizedLine {
                    file: file.to_string(),
                    line: line_no,
                    student: student.clone(),
                    text: text.to_string(),
                }),
            },
            Line::Grader(_) => errors.push(GradeError::UnrecognizedLine {
                file: file.to_string(),
                line: line_no,
                student: student.clone(),
                text: format!("**Grader:** `{}` (grader line must come last)", grader),
            }),
            Line::Blank | Line::Heading(_) => {}
        }
    }

    if !staff.iter().any(|s| s.eq_ignore_ascii_case(&grader)) {
        errors.push(GradeError::UnknownGrader {
            file: file.to_string(),
            student: student.clone(),
            grader,
        });
        return None;
    }
    if errors.len() > error_count {
        return None;
    }

    Some(StudentGradeEntry {
        student,
        url: raw.url.to_string(),
        lines: applied,
        grader,
    })
}
