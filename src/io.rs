use std::fmt::Display;
use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use console::Style;

const ANSI_BLUE: Style = Style::new().blue();

pub fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Write a build artifact, creating its parent directories.
pub fn write_artifact(path: &Utf8Path, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    fs::write(path, data)
}

/// Concatenate files in order, joined by `separator`.
pub fn concat(files: &[impl AsRef<Utf8Path>], separator: &str) -> std::io::Result<String> {
    let mut acc = String::new();

    for (i, file) in files.iter().enumerate() {
        if i > 0 {
            acc.push_str(separator);
        }
        acc.push_str(&fs::read_to_string(file.as_ref())?);
    }

    Ok(acc)
}
