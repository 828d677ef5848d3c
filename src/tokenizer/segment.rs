use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const PROGRESS_EVERY: usize = 20_000;

/// Splits a line into its characters joined by single spaces.
pub fn segment_line(line: &str) -> String {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut out = String::with_capacity(line.len() * 2);
    for (i, c) in line.chars().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Rewrites `input` as a character-segmented corpus at `output`, one line per record.
/// Returns the number of lines written.
pub fn segment_file(input: &Path, output: &Path) -> Result<usize> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Cannot open raw text '{}'", input.display()))?,
    );
    let mut writer = BufWriter::new(
        File::create(output)
            .with_context(|| format!("Cannot create corpus '{}'", output.display()))?,
    );

    let mut lines = 0;
    for line in reader.lines() {
        let line = line.with_context(|| format!("Cannot read line {} of '{}'", lines + 1, input.display()))?;
        writeln!(writer, "{}", segment_line(&line))?;
        lines += 1;
        if lines % PROGRESS_EVERY == 0 {
            tracing::info!("finished {} lines.", lines);
        }
    }
    writer.flush()?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn segment_line_spaces_every_char() {
        assert_eq!(segment_line("爽啦ok"), "爽 啦 o k");
        assert_eq!(segment_line(""), "");
        assert_eq!(segment_line("a\n"), "a");
    }

    #[test]
    fn segment_line_keeps_char_count() {
        let line = "推 文好棒!!";
        let segmented = segment_line(line);
        let kept = segmented
            .chars()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .count();
        assert_eq!(kept, line.chars().count());
        assert_eq!(segmented.chars().count(), line.chars().count() * 2 - 1);
    }

    #[test]
    fn segment_file_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("raw.txt");
        let output = dir.path().join("corpus.txt");
        fs::write(&input, "你好\nabc\n\nx\n").unwrap();

        let n = segment_file(&input, &output).unwrap();
        assert_eq!(n, 4);
        let written = fs::read_to_string(&output).unwrap();
        assert_eq!(written, "你 好\na b c\n\nx\n");
    }

    #[test]
    fn segment_file_missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        let err = segment_file(&dir.path().join("nope.txt"), &dir.path().join("out.txt"));
        assert!(err.is_err());
    }
}
