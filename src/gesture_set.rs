//! Loads the gesture prompt set from a directory of image assets. The
//! file stem names the gesture; the image itself is only handed onward to
//! whatever is presenting prompts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One promptable gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gesture {
    pub name: String,
    pub image: PathBuf,
}

/// Collect every `.png`/`.jpg` in `dir` as a gesture, sorted by name so a
/// given asset directory always yields the same set.
pub fn scan_gesture_dir(dir: &Path) -> io::Result<Vec<Gesture>> {
    let mut gestures = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_lowercase().as_str(), "png" | "jpg"))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            gestures.push(Gesture {
                name: stem.to_lowercase(),
                image: path.clone(),
            });
        }
    }
    gestures.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(gestures)
}
