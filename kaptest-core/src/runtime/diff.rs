// kaptest-core/src/runtime/diff.rs
// ============================================================================
// Module: Unified Diff
// Description: Line-based unified diff rendering for oracle messages.
// Purpose: Show expected-vs-actual mismatches with three lines of context.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Failure messages render mismatching text as a unified diff labeled
//! `Expected` / `Actual` with three lines of context. The implementation
//! is a plain longest-common-subsequence diff; oracle inputs are small
//! fixture documents, so quadratic table construction is fine.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Context lines shown around each change.
const CONTEXT_LINES: usize = 3;

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Renders a unified diff between expected and actual text.
///
/// Returns an empty string when the inputs are identical.
#[must_use]
pub fn unified_diff(expected: &str, actual: &str) -> String {
    if expected == actual {
        return String::new();
    }

    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();
    let codes = opcodes(&expected_lines, &actual_lines);

    let mut out = String::from("--- Expected\n+++ Actual\n");
    for group in grouped(&codes) {
        let Some(first) = group.first() else {
            continue;
        };
        let Some(last) = group.last() else {
            continue;
        };

        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.expected_start, last.expected_end),
            format_range(first.actual_start, last.actual_end),
        ));

        for code in &group {
            match code.tag {
                Tag::Equal => {
                    for line in &expected_lines[code.expected_start..code.expected_end] {
                        out.push(' ');
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                Tag::Delete | Tag::Replace => {
                    for line in &expected_lines[code.expected_start..code.expected_end] {
                        out.push('-');
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                Tag::Insert => {}
            }
            match code.tag {
                Tag::Insert | Tag::Replace => {
                    for line in &actual_lines[code.actual_start..code.actual_end] {
                        out.push('+');
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                Tag::Equal | Tag::Delete => {}
            }
        }
    }

    out
}

// ============================================================================
// SECTION: Opcodes
// ============================================================================

/// Edit operation over line ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    /// Ranges are identical.
    Equal,
    /// Expected lines removed.
    Delete,
    /// Actual lines added.
    Insert,
    /// Expected lines replaced by actual lines.
    Replace,
}

/// One edit over `[expected_start, expected_end)` and `[actual_start, actual_end)`.
#[derive(Debug, Clone, Copy)]
struct Opcode {
    tag: Tag,
    expected_start: usize,
    expected_end: usize,
    actual_start: usize,
    actual_end: usize,
}

/// Computes edit opcodes from a longest-common-subsequence table.
fn opcodes(expected: &[&str], actual: &[&str]) -> Vec<Opcode> {
    let rows = expected.len();
    let columns = actual.len();
    let mut table = vec![vec![0_usize; columns + 1]; rows + 1];

    for row in (0..rows).rev() {
        for column in (0..columns).rev() {
            table[row][column] = if expected[row] == actual[column] {
                table[row + 1][column + 1] + 1
            } else {
                table[row + 1][column].max(table[row][column + 1])
            };
        }
    }

    let mut steps: Vec<Tag> = Vec::new();
    let mut row = 0;
    let mut column = 0;
    while row < rows || column < columns {
        if row < rows && column < columns && expected[row] == actual[column] {
            steps.push(Tag::Equal);
            row += 1;
            column += 1;
        } else if row < rows && (column >= columns || table[row + 1][column] >= table[row][column + 1]) {
            steps.push(Tag::Delete);
            row += 1;
        } else {
            steps.push(Tag::Insert);
            column += 1;
        }
    }

    merge_steps(&steps)
}

/// Merges single-line steps into ranged opcodes, folding a delete run
/// followed by an insert run into a replace.
fn merge_steps(steps: &[Tag]) -> Vec<Opcode> {
    let mut codes: Vec<Opcode> = Vec::new();
    let mut row = 0;
    let mut column = 0;
    let mut index = 0;

    while index < steps.len() {
        let tag = steps[index];
        let mut run = 0;
        while index + run < steps.len() && steps[index + run] == tag {
            run += 1;
        }

        match tag {
            Tag::Equal => {
                codes.push(Opcode {
                    tag,
                    expected_start: row,
                    expected_end: row + run,
                    actual_start: column,
                    actual_end: column + run,
                });
                row += run;
                column += run;
            }
            Tag::Delete => {
                let mut inserts = 0;
                while index + run + inserts < steps.len() && steps[index + run + inserts] == Tag::Insert {
                    inserts += 1;
                }
                let tag = if inserts > 0 { Tag::Replace } else { Tag::Delete };
                codes.push(Opcode {
                    tag,
                    expected_start: row,
                    expected_end: row + run,
                    actual_start: column,
                    actual_end: column + inserts,
                });
                row += run;
                column += inserts;
                index += inserts;
            }
            Tag::Insert => {
                codes.push(Opcode {
                    tag,
                    expected_start: row,
                    expected_end: row,
                    actual_start: column,
                    actual_end: column + run,
                });
                column += run;
            }
            Tag::Replace => {}
        }

        index += run;
    }

    codes
}

// ============================================================================
// SECTION: Hunk Grouping
// ============================================================================

/// Groups opcodes into hunks separated by long equal runs, trimming
/// context to [`CONTEXT_LINES`] on each side.
fn grouped(codes: &[Opcode]) -> Vec<Vec<Opcode>> {
    let mut trimmed: Vec<Opcode> = codes.to_vec();

    if let Some(first) = trimmed.first_mut()
        && first.tag == Tag::Equal
    {
        first.expected_start = first.expected_start.max(first.expected_end.saturating_sub(CONTEXT_LINES));
        first.actual_start = first.actual_start.max(first.actual_end.saturating_sub(CONTEXT_LINES));
    }
    if let Some(last) = trimmed.last_mut()
        && last.tag == Tag::Equal
    {
        last.expected_end = last.expected_end.min(last.expected_start + CONTEXT_LINES);
        last.actual_end = last.actual_end.min(last.actual_start + CONTEXT_LINES);
    }

    let mut groups = Vec::new();
    let mut group: Vec<Opcode> = Vec::new();
    for code in trimmed {
        if code.tag == Tag::Equal && code.expected_end - code.expected_start > CONTEXT_LINES * 2 {
            group.push(Opcode {
                expected_end: code.expected_start + CONTEXT_LINES,
                actual_end: code.actual_start + CONTEXT_LINES,
                ..code
            });
            groups.push(group);
            group = vec![Opcode {
                expected_start: code.expected_end - CONTEXT_LINES,
                actual_start: code.actual_end - CONTEXT_LINES,
                ..code
            }];
            continue;
        }
        group.push(code);
    }

    if group.iter().any(|code| code.tag != Tag::Equal) {
        groups.push(group);
    }

    groups
}

/// Formats a hunk range as `start,length` with difflib's conventions.
fn format_range(start: usize, end: usize) -> String {
    let length = end - start;
    if length == 1 {
        return format!("{}", start + 1);
    }
    let begin = if length == 0 { start } else { start + 1 };
    format!("{begin},{length}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
