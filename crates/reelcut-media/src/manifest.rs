//! ffconcat manifest generation.

use std::borrow::Cow;
use std::path::Path;

use reelcut_models::Selection;

use crate::error::MediaResult;

/// Quote a path for an ffconcat `file` directive.
///
/// Single quotes inside the path are closed, escaped and reopened.
pub fn escape_concat_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', "'\\''"))
}

/// Relative paths resolve against the process working directory.
///
/// ffconcat resolves relative `file` entries against the manifest's own
/// directory, so every entry is written absolute.
fn absolute_source(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        return Cow::Borrowed(path);
    }
    match std::path::absolute(path) {
        Ok(abs) => Cow::Owned(abs),
        Err(_) => Cow::Borrowed(path),
    }
}

/// Render the manifest text for a selection, in selection order.
pub fn build_concat_manifest(selection: &Selection) -> String {
    let blocks: Vec<String> = selection
        .entries
        .iter()
        .map(|entry| {
            format!(
                "file {}\ninpoint {:.3}\nduration {:.3}\n",
                escape_concat_path(&absolute_source(&entry.source_path)),
                entry.start,
                entry.take_duration
            )
        })
        .collect();

    format!("ffconcat version 1.0\n\n{}", blocks.join("\n"))
}

/// Write the manifest next to the renders.
pub async fn write_concat_manifest(selection: &Selection, path: &Path) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, build_concat_manifest(selection)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcut_models::SelectionEntry;

    #[test]
    fn test_escape_single_quotes() {
        assert_eq!(
            escape_concat_path(Path::new("/tmp/it's here.mp4")),
            "'/tmp/it'\\''s here.mp4'"
        );
    }

    #[test]
    fn test_manifest_layout() {
        let selection = Selection::new(vec![
            SelectionEntry {
                source_path: "/w/a.mp4".into(),
                start: 12.0,
                take_duration: 4.0,
            },
            SelectionEntry {
                source_path: "/w/b.mp4".into(),
                start: 0.5,
                take_duration: 1.25,
            },
        ]);

        let expected = "ffconcat version 1.0\n\n\
file '/w/a.mp4'\ninpoint 12.000\nduration 4.000\n\n\
file '/w/b.mp4'\ninpoint 0.500\nduration 1.250\n";
        assert_eq!(build_concat_manifest(&selection), expected);
    }

    #[test]
    fn test_relative_sources_are_made_absolute() {
        let selection = Selection::new(vec![SelectionEntry {
            source_path: "work/job1/input/00_a.mp4".into(),
            start: 1.0,
            take_duration: 2.0,
        }]);

        let manifest = build_concat_manifest(&selection);
        let line = manifest
            .lines()
            .find(|l| l.starts_with("file "))
            .unwrap();
        let expected = std::env::current_dir()
            .unwrap()
            .join("work/job1/input/00_a.mp4");
        assert_eq!(line, format!("file {}", escape_concat_path(&expected)));
        assert!(line.starts_with("file '/"));
    }

    #[tokio::test]
    async fn test_write_manifest_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export").join("concat.txt");
        let selection = Selection::new(vec![SelectionEntry {
            source_path: "/w/a.mp4".into(),
            start: 0.0,
            take_duration: 2.0,
        }]);

        write_concat_manifest(&selection, &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ffconcat version 1.0"));
    }
}
